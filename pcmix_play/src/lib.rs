//! Streams a raw PCM file to the mixing server.

use pcmix_network::{
    client::{ConnectError, MixerConnection},
    pcmix_proto::PAYLOAD_SIZE,
};
use pcmix_utils::chunks::ChunkReader;
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

#[derive(Debug, clap::Parser)]
#[command(name = "play", version, about = "Play a raw PCM file through the mixer")]
pub struct Cli {
    /// Socket the mixer listens on
    #[arg(
        long,
        value_name = "PATH",
        env = "PCMIX_SOCKET",
        default_value = pcmix_network::DEFAULT_SOCKET_PATH
    )]
    pub socket: PathBuf,

    /// Raw signed 16-bit little-endian PCM
    #[arg(value_name = "AUDIO_FILE")]
    pub file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("cannot read {}: {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

impl PlayError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Input { .. } => 3,
            Self::Connect(ConnectError::Refused { .. }) => 4,
            Self::Connect(ConnectError::MalformedGreeting { .. }) => 5,
            Self::Connect(ConnectError::Transport(_)) => 6,
        }
    }
}

/// What was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayReport {
    pub messages: u64,
    pub bytes: u64,
}

/// Plays `file` through the mixer at `socket`.
///
/// The file is opened first, so that a bad path never reaches the server.
pub fn play(file: &Path, socket: &Path) -> Result<PlayReport, PlayError> {
    let input_err = |source| PlayError::Input {
        path: file.to_path_buf(),
        source,
    };

    let input = File::open(file).map_err(input_err)?;

    let mut conn = MixerConnection::connect(socket)?;
    conn.expect_greeting()?;

    log::debug!("playing {}", file.display());

    let mut reader = ChunkReader::<_, PAYLOAD_SIZE>::new(input);
    let mut report = PlayReport::default();

    while let Some(chunk) = reader.next_chunk().map_err(input_err)? {
        conn.send_audio(&chunk)?;
        report.messages = report.messages.strict_add(1);
    }

    report.bytes = reader.bytes_read();

    conn.disconnect()?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcmix_network::pcmix_proto::{MESSAGE_SIZE, MessageTag, MixerMessage};
    use std::{
        io::{Read, Write},
        net::Shutdown,
        os::unix::net::UnixListener,
        thread,
    };

    /// Accepts one client, greets it with `greeting`, and returns every tag it sent.
    fn fake_server(path: &Path, greeting: Vec<u8>) -> thread::JoinHandle<Vec<MessageTag>> {
        let listener = UnixListener::bind(path).unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&greeting).unwrap();
            stream.shutdown(Shutdown::Write).unwrap();

            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();

            received
                .chunks(MESSAGE_SIZE)
                .map(|frame| MixerMessage::decode(frame).unwrap().tag())
                .collect()
        })
    }

    #[test]
    fn streams_file_then_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("mixer.ipc");
        let file = dir.path().join("tone.raw");
        std::fs::write(&file, vec![1u8; PAYLOAD_SIZE + 10]).unwrap();

        let server = fake_server(&socket, MixerMessage::Greeting.encode().to_vec());

        let report = play(&file, &socket).unwrap();
        assert_eq!(
            report,
            PlayReport {
                messages: 2,
                bytes: PAYLOAD_SIZE as u64 + 10,
            }
        );

        assert_eq!(
            server.join().unwrap(),
            [MessageTag::AudioData, MessageTag::AudioData, MessageTag::Disconnect]
        );
    }

    #[test]
    fn empty_file_still_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("mixer.ipc");
        let file = dir.path().join("empty.raw");
        std::fs::write(&file, b"").unwrap();

        let server = fake_server(&socket, MixerMessage::Greeting.encode().to_vec());

        assert_eq!(play(&file, &socket).unwrap(), PlayReport::default());
        assert_eq!(server.join().unwrap(), [MessageTag::Disconnect]);
    }

    #[test]
    fn short_greeting_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("mixer.ipc");
        let file = dir.path().join("tone.raw");
        std::fs::write(&file, [0u8; 64]).unwrap();

        let server = fake_server(&socket, vec![0u8; 16]);

        let err = play(&file, &socket).unwrap_err();
        assert_eq!(err.exit_code(), 5);

        // the connection is dropped without a single message
        assert!(server.join().unwrap().is_empty());
    }

    #[test]
    fn wrong_greeting_tag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("mixer.ipc");
        let file = dir.path().join("tone.raw");
        std::fs::write(&file, [0u8; 64]).unwrap();

        let server = fake_server(&socket, MixerMessage::Ack.encode().to_vec());

        let err = play(&file, &socket).unwrap_err();
        assert!(matches!(
            err,
            PlayError::Connect(ConnectError::MalformedGreeting {
                received: MESSAGE_SIZE,
                tag: Some(MessageTag::Ack),
            })
        ));
        assert!(server.join().unwrap().is_empty());
    }

    #[test]
    fn unreadable_file_is_checked_before_connecting() {
        let dir = tempfile::tempdir().unwrap();

        // no server at all: the input error must come first
        let err = play(
            &dir.path().join("nope.raw"),
            &dir.path().join("mixer.ipc"),
        )
        .unwrap_err();

        assert!(matches!(err, PlayError::Input { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn missing_server_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tone.raw");
        std::fs::write(&file, [0u8; 4]).unwrap();

        let err = play(&file, &dir.path().join("mixer.ipc")).unwrap_err();

        assert!(matches!(err, PlayError::Connect(ConnectError::Refused { .. })));
        assert_eq!(err.exit_code(), 4);
    }
}

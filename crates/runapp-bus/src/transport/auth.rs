//! SASL `EXTERNAL` authentication performed before the first message.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::error::ConnectError;

const MAX_LINE_LEN: usize = 512;

fn handshake_error(stage: &'static str) -> impl FnOnce(io::Error) -> ConnectError {
    move |source| ConnectError::Handshake {
        stage,
        source: Arc::new(source),
    }
}

/// Hex-encodes the decimal text of `uid`, as `AUTH EXTERNAL` expects.
pub(super) fn external_identity(uid: u32) -> String {
    uid.to_string()
        .bytes()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Authenticates as `uid` over a blocking stream and returns the server GUID.
pub(super) fn authenticate<S>(stream: &mut S, uid: u32) -> Result<String, ConnectError>
where
    S: Read + Write,
{
    let request = format!("\0AUTH EXTERNAL {}\r\n", external_identity(uid));
    stream
        .write_all(request.as_bytes())
        .map_err(handshake_error("AUTH"))?;
    let response = read_line(stream).map_err(handshake_error("AUTH response"))?;
    let Some(accepted) = response.strip_prefix("OK ") else {
        return Err(ConnectError::Rejected { response });
    };
    let guid = accepted.trim().to_owned();
    stream
        .write_all(b"BEGIN\r\n")
        .map_err(handshake_error("BEGIN"))?;
    tracing::debug!(
        target: crate::reporter::CONNECTION_TARGET,
        guid = %guid,
        "authenticated with bus"
    );
    Ok(guid)
}

fn read_line<S: Read>(stream: &mut S) -> io::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0_u8; 1];
    while !line.ends_with(b"\r\n") {
        if line.len() >= MAX_LINE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "authentication line too long",
            ));
        }
        if stream.read(&mut byte)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        line.extend_from_slice(&byte);
    }
    line.truncate(line.len() - 2);
    String::from_utf8(line)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "authentication line is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn new(reply: &str) -> Self {
            Self {
                input: Cursor::new(reply.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn identity_is_hex_of_decimal_uid() {
        assert_eq!(external_identity(1000), "31303030");
        assert_eq!(external_identity(0), "30");
    }

    #[test]
    fn successful_exchange_returns_guid() {
        let mut stream = Scripted::new("OK 0123456789abcdef\r\n");
        let guid = authenticate(&mut stream, 1000).expect("authentication succeeds");
        assert_eq!(guid, "0123456789abcdef");
        assert_eq!(
            stream.output,
            b"\0AUTH EXTERNAL 31303030\r\nBEGIN\r\n".to_vec()
        );
    }

    #[test]
    fn rejection_is_reported() {
        let mut stream = Scripted::new("REJECTED EXTERNAL\r\n");
        let error = authenticate(&mut stream, 1000).expect_err("rejected");
        assert!(
            matches!(&error, ConnectError::Rejected { response } if response == "REJECTED EXTERNAL"),
            "unexpected {error:?}"
        );
    }

    #[test]
    fn truncated_response_is_a_handshake_error() {
        let mut stream = Scripted::new("OK 01");
        let error = authenticate(&mut stream, 1000).expect_err("eof");
        assert!(matches!(error, ConnectError::Handshake { .. }), "unexpected {error:?}");
    }
}

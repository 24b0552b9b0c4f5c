//! IPC client for sending commands to the daemon.

use crate::error::{CaptransError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send one command to the daemon and wait for its reply.
///
/// # Errors
/// Returns `CaptransError::IpcConnection` if the socket cannot be reached
/// and `CaptransError::IpcProtocol` if the reply cannot be decoded.
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|e| CaptransError::IpcConnection {
                message: format!("Failed to connect to daemon: {}", e),
            })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut command_json = command.to_json().map_err(|e| CaptransError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;
    command_json.push('\n');

    writer
        .write_all(command_json.as_bytes())
        .await
        .map_err(|e| CaptransError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| CaptransError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| CaptransError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    Response::from_json(response_line.trim()).map_err(|e| CaptransError::IpcProtocol {
        message: format!("Failed to deserialize response: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::{CommandHandler, IpcServer};
    use crate::translate::TranslateError;
    use tempfile::TempDir;

    struct MockHandler;

    #[async_trait::async_trait]
    impl CommandHandler for MockHandler {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Translate { text, context } if text == "Hello" => {
                    Response::translated(format!("你好 ({} context)", context.len()))
                }
                Command::Translate { .. } => Response::from_error(&TranslateError::Timeout),
                _ => Response::ok(),
            }
        }
    }

    async fn start_server(socket_path: &Path) {
        let server_socket_path = socket_path.to_path_buf();
        tokio::spawn(async move {
            let server = IpcServer::new(server_socket_path).unwrap();
            server.start(MockHandler).await
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_send_translate() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        start_server(&socket_path).await;

        let response = send_command(
            &socket_path,
            Command::Translate {
                text: "Hello".to_string(),
                context: vec!["Hi".to_string()],
            },
        )
        .await
        .unwrap();
        assert_eq!(response, Response::translated("你好 (1 context)"));
    }

    #[tokio::test]
    async fn test_failure_reply_is_not_a_transport_error() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        start_server(&socket_path).await;

        let response = send_command(
            &socket_path,
            Command::Translate {
                text: "slow".to_string(),
                context: vec![],
            },
        )
        .await
        .unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("TIMEOUT"));
    }

    #[tokio::test]
    async fn test_send_command_connection_failed() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("nonexistent.sock");

        let err = send_command(&socket_path, Command::Status)
            .await
            .unwrap_err();
        match err {
            CaptransError::IpcConnection { message } => {
                assert!(message.contains("Failed to connect to daemon"));
            }
            _ => panic!("Expected IpcConnection error, got: {:?}", err),
        }
    }

    #[tokio::test]
    async fn test_multiple_sequential_commands() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        start_server(&socket_path).await;

        let commands = vec![
            Command::Status,
            Command::ClearCache,
            Command::Set {
                key: "model".to_string(),
                value: serde_json::json!("gpt-4o"),
            },
            Command::Shutdown,
        ];

        for cmd in commands {
            let response = send_command(&socket_path, cmd.clone()).await.unwrap();
            assert!(response.success, "Unexpected response for {:?}", cmd);
        }
    }
}

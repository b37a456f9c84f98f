//! # SMTP Transport
//!
//! Runs one mail transaction per request:
//!
//! ```text
//! <- 220 greeting
//! -> EHLO, AUTH PLAIN (with basic credentials only)
//! -> MAIL FROM, then RCPT TO for every envelope recipient
//! -> DATA, the dot-stuffed message, "."
//! -> QUIT
//! ```
//!
//! Refused recipients do not stop the loop: every refusal is collected, the transaction is
//! reset and the call fails with all of them as one aggregate [`Fault`].
use super::SmtpRequest;
use crate::client::{
    ConnectionInformation, Credentials, Fault, Transport, TransportExecutor, block_on,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::{fmt, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Handle,
};
use tracing::{debug, warn};

const DEFAULT_CLIENT_NAME: &str = "localhost";

#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    #[error("Failed to connect to '{address}': '{source}'")]
    Connect {
        address: String,
        source: std::io::Error,
    },
    #[error("SMTP connection error: '{0}'")]
    Io(#[from] std::io::Error),
    #[error("The SMTP server closed the connection")]
    Closed,
    #[error("Malformed SMTP reply '{0}'")]
    MalformedReply(String),
    #[error("{command} was rejected: {reply}")]
    Rejected {
        command: &'static str,
        reply: SmtpReply,
    },
    #[error("Recipient <{recipient}> was rejected: {reply}")]
    RecipientRejected { recipient: String, reply: SmtpReply },
    #[error("Bearer credentials are not supported by the SMTP transport")]
    UnsupportedCredentials,
    #[error("The SMTP session did not complete within {0:?}")]
    Timeout(Duration),
}

/// A complete, possibly multi-line, server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

/// What the server acknowledged for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReceipt {
    /// The envelope recipients the server accepted, in the order they were sent.
    pub accepted: Vec<String>,
    /// The server's reply to the end of the message data.
    pub reply: String,
}

/// A [`TransportExecutor`] that delivers [`SmtpRequest`]s.
///
/// `connection.address` is `host:port`, optionally prefixed with `smtp://`. The session
/// runs on the stored runtime handle through [`block_on`].
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    runtime: Handle,
    client_name: String,
}

impl SmtpTransport {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }

    /// The name announced in `EHLO`.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    #[tracing::instrument(skip_all, fields(server = %connection.address))]
    async fn send(
        &self,
        connection: &ConnectionInformation,
        request: &SmtpRequest,
    ) -> Result<SmtpReceipt, Fault> {
        let auth = match &connection.credentials {
            None => None,
            Some(Credentials::Basic { username, password }) => {
                Some(STANDARD.encode(format!("\0{username}\0{password}")))
            }
            Some(Credentials::Bearer { .. }) => return Err(SmtpError::UnsupportedCredentials.into()),
        };

        let address = socket_address(&connection.address);
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| SmtpError::Connect {
                address: address.to_string(),
                source,
            })?;
        let mut session = Session::new(stream);

        session.expect_reply("Connection", &[220]).await?;
        session
            .expect("EHLO", &format!("EHLO {}", self.client_name), &[250])
            .await?;
        if let Some(token) = auth {
            session
                .expect("AUTH", &format!("AUTH PLAIN {token}"), &[235])
                .await?;
        }
        session
            .expect(
                "MAIL FROM",
                &format!("MAIL FROM:<{}>", request.from().address()),
                &[250],
            )
            .await?;

        let mut accepted = Vec::new();
        let mut rejections = Vec::new();
        for recipient in request.envelope_recipients() {
            let reply = session.command(&format!("RCPT TO:<{recipient}>")).await?;
            if matches!(reply.code, 250 | 251) {
                accepted.push(recipient.to_string());
            } else {
                debug!(recipient, code = reply.code, "recipient rejected");
                rejections.push(Fault::new(SmtpError::RecipientRejected {
                    recipient: recipient.to_string(),
                    reply,
                }));
            }
        }

        if !rejections.is_empty() {
            if let Err(err) = session.command("RSET").await {
                warn!(error = %err, "failed to reset the transaction");
            }
            session.quit().await;
            return Err(Fault::aggregate(rejections));
        }

        session.expect("DATA", "DATA", &[354]).await?;
        let reply = session.data(&request.to_message()).await?;
        session.quit().await;

        debug!(recipients = accepted.len(), "message delivered");
        Ok(SmtpReceipt {
            accepted,
            reply: reply.text(),
        })
    }
}

impl Transport for SmtpTransport {
    type Request = SmtpRequest;
}

impl TransportExecutor<SmtpReceipt> for SmtpTransport {
    fn run_transport(
        &self,
        connection: &ConnectionInformation,
        request: &SmtpRequest,
    ) -> Result<SmtpReceipt, Fault> {
        let session = async {
            match connection.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.send(connection, request))
                    .await
                    .unwrap_or_else(|_| Err(SmtpError::Timeout(timeout).into())),
                None => self.send(connection, request).await,
            }
        };

        block_on(&self.runtime, session)?
    }
}

fn socket_address(address: &str) -> &str {
    address.strip_prefix("smtp://").unwrap_or(address)
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Session {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn read_reply(&mut self) -> Result<SmtpReply, SmtpError> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(SmtpError::Closed);
            }
            let line = line.trim_end_matches(['\r', '\n']);

            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| SmtpError::MalformedReply(line.to_string()))?;
            lines.push(line.get(4..).unwrap_or_default().to_string());

            match line.as_bytes().get(3) {
                Some(b'-') => continue,
                None | Some(b' ') => return Ok(SmtpReply { code, lines }),
                Some(_) => return Err(SmtpError::MalformedReply(line.to_string())),
            }
        }
    }

    async fn command(&mut self, line: &str) -> Result<SmtpReply, SmtpError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        self.read_reply().await
    }

    async fn expect_reply(
        &mut self,
        command: &'static str,
        accepted: &[u16],
    ) -> Result<SmtpReply, SmtpError> {
        let reply = self.read_reply().await?;
        check(command, reply, accepted)
    }

    /// `command` names the step in errors, so secrets sent in `line` stay out of them.
    async fn expect(
        &mut self,
        command: &'static str,
        line: &str,
        accepted: &[u16],
    ) -> Result<SmtpReply, SmtpError> {
        let reply = self.command(line).await?;
        check(command, reply, accepted)
    }

    async fn data(&mut self, message: &str) -> Result<SmtpReply, SmtpError> {
        self.writer.write_all(dot_stuff(message).as_bytes()).await?;
        self.writer.write_all(b".\r\n").await?;
        self.writer.flush().await?;

        let reply = self.read_reply().await?;
        check("Message data", reply, &[250])
    }

    async fn quit(&mut self) {
        if let Err(err) = self.command("QUIT").await {
            warn!(error = %err, "failed to close the SMTP session cleanly");
        }
    }
}

fn check(command: &'static str, reply: SmtpReply, accepted: &[u16]) -> Result<SmtpReply, SmtpError> {
    if accepted.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(SmtpError::Rejected { command, reply })
    }
}

/// Doubles leading dots and makes sure the data ends with CRLF, ready for the `.` terminator.
fn dot_stuff(message: &str) -> String {
    let mut stuffed = message
        .split("\r\n")
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n");

    if !stuffed.ends_with("\r\n") {
        stuffed.push_str("\r\n");
    }
    stuffed
}

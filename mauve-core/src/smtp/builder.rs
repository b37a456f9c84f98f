//! # SMTP Request Builder
//!
//! Assembles an [`SmtpRequest`] step by step. Builder methods never fail; the first problem
//! encountered (an invalid address, an attachment that cannot be serialized, a malformed
//! header) is kept and reported by [`SmtpRequestBuilder::build`].
//!
//! ```rust
//! use mauve_core::serialization::SerializationMethod;
//! use mauve_core::smtp::SmtpRequestBuilder;
//!
//! let request = SmtpRequestBuilder::with_recipient("reports@example.com", "ada@example.com")
//!     .carbon_copy("Charles Babbage <charles@example.com>")
//!     .subject("Nightly run")
//!     .write_line("All jobs finished.")
//!     .attach_as("summary", &vec![1, 2, 3], SerializationMethod::Yaml)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.envelope_recipients(), vec!["ada@example.com", "charles@example.com"]);
//! assert_eq!(request.attachments()[0].name, "summary.yaml");
//! ```
use super::{AddressError, Attachment, Mailbox, SmtpRequest};
use crate::serialization::{self, SerializationMethod, SerializeError};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SmtpBuildError {
    #[error("Invalid {field} address: '{source}'")]
    Address {
        field: &'static str,
        source: AddressError,
    },
    #[error("Failed to read attachment '{path}': '{source}'")]
    Attachment {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize attachment '{name}': '{source}'")]
    Serialize {
        name: String,
        source: SerializeError,
    },
    #[error("Invalid header '{name}': {reason}")]
    Header { name: String, reason: &'static str },
    #[error("The message has no recipients")]
    NoRecipients,
}

#[derive(Debug)]
enum PendingAttachment {
    File(PathBuf),
    Ready(Attachment),
}

#[derive(Debug)]
pub struct SmtpRequestBuilder {
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    reply_to: Vec<Mailbox>,
    subject: String,
    body: String,
    headers: Vec<(String, String)>,
    attachments: Vec<PendingAttachment>,
    error: Option<SmtpBuildError>,
}

impl SmtpRequestBuilder {
    pub fn new(from: &str) -> Self {
        let mut builder = Self {
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: String::new(),
            body: String::new(),
            headers: Vec::new(),
            attachments: Vec::new(),
            error: None,
        };
        builder.from = builder.mailbox("from", from);
        builder
    }

    pub fn with_recipient(from: &str, to: &str) -> Self {
        Self::new(from).send_to(to)
    }

    pub fn send_to(mut self, address: &str) -> Self {
        if let Some(mailbox) = self.mailbox("to", address) {
            self.to.push(mailbox);
        }
        self
    }

    pub fn carbon_copy(mut self, address: &str) -> Self {
        if let Some(mailbox) = self.mailbox("cc", address) {
            self.cc.push(mailbox);
        }
        self
    }

    /// Adds an envelope-only recipient; it never appears in the rendered headers.
    pub fn blind_carbon_copy(mut self, address: &str) -> Self {
        if let Some(mailbox) = self.mailbox("bcc", address) {
            self.bcc.push(mailbox);
        }
        self
    }

    /// Adds an address to the `Reply-To` header. Reply-To addresses are not recipients.
    pub fn reply_to(mut self, address: &str) -> Self {
        if let Some(mailbox) = self.mailbox("reply-to", address) {
            self.reply_to.push(mailbox);
        }
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn write(mut self, text: &str) -> Self {
        self.body.push_str(text);
        self
    }

    pub fn write_line(mut self, text: &str) -> Self {
        self.body.push_str(text);
        self.body.push('\n');
        self
    }

    /// Adds a custom header. Headers are rendered in the order they were added.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match validate_header(name, value) {
            Ok(()) => self.headers.push((name.to_string(), value.to_string())),
            Err(reason) => self.fail(SmtpBuildError::Header {
                name: name.to_string(),
                reason,
            }),
        }
        self
    }

    /// Attaches the file at `path`. The file is read when the request is built.
    pub fn attach_file(mut self, path: impl AsRef<Path>) -> Self {
        self.attachments
            .push(PendingAttachment::File(path.as_ref().to_path_buf()));
        self
    }

    /// Attaches `data` serialized as JSON, named `{name}.json`.
    pub fn attach<T: Serialize + ?Sized>(self, name: &str, data: &T) -> Self {
        self.attach_as(name, data, SerializationMethod::Json)
    }

    /// Attaches `data` serialized with `method`, named `{name}.{extension}`.
    pub fn attach_as<T: Serialize + ?Sized>(
        mut self,
        name: &str,
        data: &T,
        method: SerializationMethod,
    ) -> Self {
        match serialization::serialize(data, method) {
            Ok(text) => self.attachments.push(PendingAttachment::Ready(Attachment {
                name: format!("{name}.{}", method.extension()),
                content_type: method.content_type().to_string(),
                data: text.into_bytes(),
            })),
            Err(source) => self.fail(SmtpBuildError::Serialize {
                name: name.to_string(),
                source,
            }),
        }
        self
    }

    pub fn build(self) -> Result<SmtpRequest, SmtpBuildError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let Some(from) = self.from else {
            return Err(SmtpBuildError::Address {
                field: "from",
                source: AddressError::Empty,
            });
        };
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(SmtpBuildError::NoRecipients);
        }

        let attachments = self
            .attachments
            .into_iter()
            .map(|pending| match pending {
                PendingAttachment::Ready(attachment) => Ok(attachment),
                PendingAttachment::File(path) => read_attachment(path),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let id = Uuid::new_v4().simple();
        Ok(SmtpRequest {
            date: Utc::now(),
            message_id: format!("<{id}@{}>", from.domain()),
            boundary: format!("mauve-{id}"),
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            subject: self.subject,
            body: self.body,
            headers: self.headers,
            attachments,
        })
    }

    fn mailbox(&mut self, field: &'static str, address: &str) -> Option<Mailbox> {
        match address.parse() {
            Ok(mailbox) => Some(mailbox),
            Err(source) => {
                self.fail(SmtpBuildError::Address { field, source });
                None
            }
        }
    }

    fn fail(&mut self, err: SmtpBuildError) {
        self.error.get_or_insert(err);
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("the name is empty");
    }
    if !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
        return Err("the name must be printable ASCII without ':'");
    }
    if value.contains(['\r', '\n']) {
        return Err("the value must not contain line breaks");
    }
    Ok(())
}

fn read_attachment(path: PathBuf) -> Result<Attachment, SmtpBuildError> {
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(source) => return Err(SmtpBuildError::Attachment { path, source }),
    };
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());

    Ok(Attachment {
        content_type: content_type_for(&path).to_string(),
        name,
        data,
    })
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SmtpRequestBuilder {
        SmtpRequestBuilder::with_recipient("Reports <reports@example.com>", "ada@example.com")
    }

    #[test]
    fn test_first_invalid_address_surfaces_at_build() {
        let err = builder()
            .carbon_copy("nope")
            .send_to("also wrong")
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            SmtpBuildError::Address { field: "cc", source: AddressError::Malformed(ref s) } if s == "nope"
        ));
    }

    #[test]
    fn test_invalid_sender_is_reported() {
        let err = SmtpRequestBuilder::with_recipient("", "ada@example.com")
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            SmtpBuildError::Address { field: "from", source: AddressError::Empty }
        ));
    }

    #[test]
    fn test_message_without_recipients_is_rejected() {
        let err = SmtpRequestBuilder::new("reports@example.com")
            .reply_to("ada@example.com")
            .build()
            .unwrap_err();

        assert!(matches!(err, SmtpBuildError::NoRecipients));
    }

    #[test]
    fn test_serialized_attachments_are_named_after_the_method() {
        let request = builder()
            .attach("data", &serde_json::json!({ "ok": true }))
            .attach_as("data", "plain", SerializationMethod::Raw)
            .build()
            .unwrap();

        let attachments = request.attachments();
        assert_eq!(attachments[0].name, "data.json");
        assert_eq!(attachments[0].content_type, "application/json");
        assert_eq!(attachments[0].data, br#"{"ok":true}"#);
        assert_eq!(attachments[1].name, "data.raw");
        assert_eq!(attachments[1].content_type, "text/plain");
        assert_eq!(attachments[1].data, b"plain");
    }

    #[test]
    fn test_missing_file_attachment_fails_the_build() {
        let err = builder()
            .attach_file("/definitely/not/here.txt")
            .build()
            .unwrap_err();

        assert!(
            matches!(err, SmtpBuildError::Attachment { ref path, .. } if path == Path::new("/definitely/not/here.txt"))
        );
    }

    #[test]
    fn test_file_attachment_is_read_at_build() {
        let path = std::env::temp_dir().join(format!("mauve-{}.csv", Uuid::new_v4()));
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let request = builder().attach_file(&path).build();
        std::fs::remove_file(&path).unwrap();

        let request = request.unwrap();
        let attachment = &request.attachments()[0];
        assert_eq!(attachment.content_type, "text/csv");
        assert_eq!(attachment.data, b"a,b\n1,2\n");
        assert!(attachment.name.ends_with(".csv"));
    }

    #[test]
    fn test_header_injection_is_rejected() {
        let err = builder()
            .header("X-Tag", "ok\r\nBcc: evil@example.com")
            .build()
            .unwrap_err();

        assert!(matches!(err, SmtpBuildError::Header { ref name, .. } if name == "X-Tag"));
    }

    #[test]
    fn test_rendered_message() {
        let request = builder()
            .send_to("ada@example.com")
            .carbon_copy("charles@example.com")
            .blind_carbon_copy("audit@example.com")
            .reply_to("support@example.com")
            .subject("Résumé")
            .header("X-Priority", "1")
            .write("line one\n")
            .write_line("line two")
            .build()
            .unwrap();

        assert_eq!(
            request.envelope_recipients(),
            vec!["ada@example.com", "charles@example.com", "audit@example.com"]
        );

        let message = request.to_message();
        let expected_head = format!(
            "Date: {}\r\n\
             From: Reports <reports@example.com>\r\n\
             To: ada@example.com, ada@example.com\r\n\
             Cc: charles@example.com\r\n\
             Reply-To: support@example.com\r\n\
             Subject: =?utf-8?B?UsOpc3Vtw6k=?=\r\n\
             Message-ID: {}\r\n\
             X-Priority: 1\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             line one\r\nline two\r\n",
            request.date().to_rfc2822(),
            request.message_id()
        );
        assert_eq!(message, expected_head);
        assert!(!message.contains("audit@example.com"));
        assert!(request.message_id().ends_with("@example.com>"));
    }

    #[test]
    fn test_attachments_produce_a_multipart_message() {
        let request = builder()
            .write("see attached")
            .attach("numbers", &[1, 2, 3])
            .build()
            .unwrap();

        let message = request.to_message();

        assert!(message.contains("Content-Type: multipart/mixed; boundary=\"mauve-"));
        assert!(message.contains(
            "Content-Type: application/json; name=\"numbers.json\"\r\n\
             Content-Disposition: attachment; filename=\"numbers.json\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             WzEsMiwzXQ==\r\n"
        ));
        assert!(message.contains("\r\nsee attached\r\n"));
        assert!(message.trim_end().ends_with("--"));
    }

    #[test]
    fn test_date_is_taken_when_the_request_is_built() {
        let before = Utc::now();
        let request = builder().write("hi").build().unwrap();
        let after = Utc::now();

        assert!(before <= request.date() && request.date() <= after);
        assert!(
            request
                .to_message()
                .starts_with(&format!("Date: {}\r\n", request.date().to_rfc2822()))
        );
        assert!(request.date().to_rfc2822().ends_with(" +0000"));
    }

    #[test]
    fn test_attachment_names_are_quoted() {
        let request = builder()
            .write("see attached")
            .attach("we\"ird\\name", &1)
            .build()
            .unwrap();

        let message = request.to_message();

        assert!(message.contains(
            "Content-Type: application/json; name=\"we\\\"ird\\\\name.json\"\r\n\
             Content-Disposition: attachment; filename=\"we\\\"ird\\\\name.json\"\r\n"
        ));
    }
}

use super::Mailbox;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};

/// Longest run of bytes packed into one RFC 2047 encoded word, so that the word stays
/// within 75 characters.
const ENCODED_WORD_CHUNK: usize = 45;
/// Base64 bodies are wrapped at this many characters per line.
const BASE64_LINE: usize = 76;

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A complete mail transaction: the envelope plus the message to deliver.
///
/// Built with [`super::SmtpRequestBuilder`] and sent with [`super::SmtpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpRequest {
    pub(super) from: Mailbox,
    pub(super) to: Vec<Mailbox>,
    pub(super) cc: Vec<Mailbox>,
    pub(super) bcc: Vec<Mailbox>,
    pub(super) reply_to: Vec<Mailbox>,
    pub(super) subject: String,
    pub(super) body: String,
    pub(super) headers: Vec<(String, String)>,
    pub(super) attachments: Vec<Attachment>,
    pub(super) date: DateTime<Utc>,
    pub(super) message_id: String,
    pub(super) boundary: String,
}

impl SmtpRequest {
    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    pub fn to(&self) -> &[Mailbox] {
        &self.to
    }

    pub fn carbon_copy(&self) -> &[Mailbox] {
        &self.cc
    }

    pub fn blind_carbon_copy(&self) -> &[Mailbox] {
        &self.bcc
    }

    pub fn reply_to(&self) -> &[Mailbox] {
        &self.reply_to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// When the request was built. Rendered as the `Date` header.
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Every address the message is delivered to: To, then Cc, then Bcc, without
    /// duplicates (addresses compare case-insensitively).
    pub fn envelope_recipients(&self) -> Vec<&str> {
        let mut recipients: Vec<&str> = Vec::new();

        for mailbox in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            let address = mailbox.address();
            if !recipients.iter().any(|r| r.eq_ignore_ascii_case(address)) {
                recipients.push(address);
            }
        }

        recipients
    }

    /// Renders the message as RFC 5322 text with CRLF line endings.
    ///
    /// Bcc recipients are not rendered.
    pub fn to_message(&self) -> String {
        let mut message = String::new();

        header(&mut message, "Date", &self.date.to_rfc2822());
        header(&mut message, "From", &self.from.to_string());
        address_header(&mut message, "To", &self.to);
        address_header(&mut message, "Cc", &self.cc);
        address_header(&mut message, "Reply-To", &self.reply_to);
        header(&mut message, "Subject", &encode_text(&self.subject));
        header(&mut message, "Message-ID", &self.message_id);
        for (name, value) in &self.headers {
            header(&mut message, name, &encode_text(value));
        }
        header(&mut message, "MIME-Version", "1.0");

        if self.attachments.is_empty() {
            text_part(&mut message, &self.body);
            return message;
        }

        header(
            &mut message,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{}\"", self.boundary),
        );
        message.push_str("\r\n");

        delimiter(&mut message, &self.boundary, "");
        text_part(&mut message, &self.body);

        for attachment in &self.attachments {
            delimiter(&mut message, &self.boundary, "");
            attachment_part(&mut message, attachment);
        }
        delimiter(&mut message, &self.boundary, "--");

        message
    }
}

fn header(message: &mut String, name: &str, value: &str) {
    message.push_str(&format!("{name}: {value}\r\n"));
}

fn delimiter(message: &mut String, boundary: &str, suffix: &str) {
    message.push_str(&format!("--{boundary}{suffix}\r\n"));
}

fn address_header(message: &mut String, name: &str, mailboxes: &[Mailbox]) {
    if mailboxes.is_empty() {
        return;
    }
    let value = mailboxes
        .iter()
        .map(Mailbox::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    header(message, name, &value);
}

fn text_part(message: &mut String, body: &str) {
    let body = crlf(body);

    header(message, "Content-Type", "text/plain; charset=utf-8");
    if body.is_ascii() {
        header(message, "Content-Transfer-Encoding", "7bit");
        message.push_str("\r\n");
        message.push_str(&body);
        if !body.is_empty() && !body.ends_with("\r\n") {
            message.push_str("\r\n");
        }
    } else {
        header(message, "Content-Transfer-Encoding", "base64");
        message.push_str("\r\n");
        base64_lines(message, body.as_bytes());
    }
}

fn attachment_part(message: &mut String, attachment: &Attachment) {
    let name = quoted(&attachment.name);

    header(
        message,
        "Content-Type",
        &format!("{}; name={name}", attachment.content_type),
    );
    header(
        message,
        "Content-Disposition",
        &format!("attachment; filename={name}"),
    );
    header(message, "Content-Transfer-Encoding", "base64");
    message.push_str("\r\n");
    base64_lines(message, &attachment.data);
}

fn base64_lines(message: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    // Base64 output is ASCII, so byte chunks are valid UTF-8.
    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        message.push_str(&String::from_utf8_lossy(line));
        message.push_str("\r\n");
    }
}

/// Normalizes line endings to CRLF.
fn crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\r\n")
}

/// Returns `text` unchanged when it is printable ASCII, otherwise as RFC 2047 encoded words.
fn encode_text(text: &str) -> String {
    if text.is_ascii() && !text.contains(['\r', '\n']) {
        text.to_string()
    } else {
        encode_word(text)
    }
}

/// Renders a MIME parameter value as a quoted string, escaping `"` and `\`.
///
/// Values that are not printable ASCII are encoded first, as for header text.
fn quoted(value: &str) -> String {
    let value = encode_text(value);
    let mut quoted = String::with_capacity(value.len() + 2);

    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');

    quoted
}

/// Encodes `text` as one or more RFC 2047 `B` encoded words, folded onto continuation lines.
pub(super) fn encode_word(text: &str) -> String {
    let mut words = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + ENCODED_WORD_CHUNK).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(&text[start..end])));
        start = end;
    }

    words.join("\r\n ")
}

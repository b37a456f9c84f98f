use super::message::encode_word;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Email address is empty")]
    Empty,
    #[error("Email address '{0}' has an unterminated '<'")]
    Unterminated(String),
    #[error("Email address '{0}' must have the form 'local@domain'")]
    Malformed(String),
}

/// An email address with an optional display name.
///
/// Parses `local@domain` and `Display Name <local@domain>` (the name may be quoted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    name: Option<String>,
    address: String,
}

impl Mailbox {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The bare `local@domain` part, as used in the SMTP envelope.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or_default()
    }
}

impl FromStr for Mailbox {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let (name, address) = match s.find('<') {
            Some(open) => {
                let inner = s[open + 1..]
                    .strip_suffix('>')
                    .ok_or_else(|| AddressError::Unterminated(s.to_string()))?;
                let name = s[..open].trim().trim_matches('"').trim();
                let name = (!name.is_empty()).then(|| name.to_string());
                (name, inner.trim())
            }
            None => (None, s),
        };

        if !is_valid_address(address) {
            return Err(AddressError::Malformed(s.to_string()));
        }

        Ok(Self {
            name,
            address: address.to_string(),
        })
    }
}

fn is_valid_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    let forbidden = |c: char| c.is_whitespace() || c.is_control() || "<>@,;\"".contains(c);

    !local.is_empty()
        && !domain.is_empty()
        && !local.contains(forbidden)
        && !domain.contains(forbidden)
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Renders the mailbox as it appears in a message header.
impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            None => f.write_str(&self.address),
            Some(name) if !name.is_ascii() => write!(f, "{} <{}>", encode_word(name), self.address),
            Some(name) if name.contains(|c: char| "()<>[]:;@\\,.\"".contains(c)) => {
                let name = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{name}\" <{}>", self.address)
            }
            Some(name) => write!(f, "{name} <{}>", self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_and_named_addresses() {
        let bare: Mailbox = "ada@example.com".parse().unwrap();
        assert_eq!(bare.name(), None);
        assert_eq!(bare.address(), "ada@example.com");
        assert_eq!(bare.domain(), "example.com");

        let named: Mailbox = " \"Ada Lovelace\" <ada@example.com> ".parse().unwrap();
        assert_eq!(named.name(), Some("Ada Lovelace"));
        assert_eq!(named.address(), "ada@example.com");
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        assert_eq!("".parse::<Mailbox>(), Err(AddressError::Empty));
        assert_eq!(
            "not-an-address".parse::<Mailbox>(),
            Err(AddressError::Malformed("not-an-address".to_string()))
        );
        assert_eq!(
            "Ada <ada@example.com".parse::<Mailbox>(),
            Err(AddressError::Unterminated("Ada <ada@example.com".to_string()))
        );
        assert!("a b@example.com".parse::<Mailbox>().is_err());
        assert!("ada@".parse::<Mailbox>().is_err());
        assert!("ada@example..com".parse::<Mailbox>().is_err());
    }

    #[test]
    fn test_display_quotes_or_encodes_names() {
        let plain: Mailbox = "Ada <ada@example.com>".parse().unwrap();
        assert_eq!(plain.to_string(), "Ada <ada@example.com>");

        let dotted: Mailbox = "A. Lovelace <ada@example.com>".parse().unwrap();
        assert_eq!(dotted.to_string(), "\"A. Lovelace\" <ada@example.com>");

        let accented: Mailbox = "José <jose@example.com>".parse().unwrap();
        assert_eq!(accented.to_string(), "=?utf-8?B?Sm9zw6k=?= <jose@example.com>");

        let escaped: Mailbox = r"Lab\One <lab@example.com>".parse().unwrap();
        assert_eq!(escaped.to_string(), r#""Lab\\One" <lab@example.com>"#);
    }
}

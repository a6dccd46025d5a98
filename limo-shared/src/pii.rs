use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A wrapper for customer contact data (emails, phone numbers) that hides its
/// value in `Debug` and `Display` output while still serializing the real value.
///
/// Use it in `tracing` fields so contact details never reach the logs:
/// `info!(email = %Masked(&contact.email), "...")`.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    /// Keeps the first character and, for emails, the domain: `a****@x.com`.
    pub fn redacted(&self) -> String {
        let value = self.0.as_ref();
        let (local, domain) = match value.split_once('@') {
            Some((local, domain)) => (local, Some(domain)),
            None => (value, None),
        };

        let mut out = String::with_capacity(value.len());
        if let Some(first) = local.chars().next() {
            out.push(first);
        }
        out.push_str("****");
        if let Some(domain) = domain {
            out.push('@');
            out.push_str(domain);
        }
        out
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Masked({})", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // API responses need the real value; masking only applies to formatting.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

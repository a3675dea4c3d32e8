use std::collections::BTreeMap;

/// A validated request to send one email.
///
/// Only [`decode`](crate::decode) builds one, and only when `template`, `to`
/// and `from` are all non-empty. Header and param keys are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailCommand {
    pub(crate) template: String,
    pub(crate) to: String,
    pub(crate) from: String,
    pub(crate) cc: Option<String>,
    pub(crate) bcc: Option<String>,
    pub(crate) locale: Option<String>,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) params: BTreeMap<String, String>,
}

impl EmailCommand {
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }

    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    #[must_use]
    pub fn cc(&self) -> Option<&str> {
        self.cc.as_deref()
    }

    #[must_use]
    pub fn bcc(&self) -> Option<&str> {
        self.bcc.as_deref()
    }

    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Look up a header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(String::as_str)
    }

    /// Look up a template parameter, case-insensitively.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_lowercase())
            .map(String::as_str)
    }
}

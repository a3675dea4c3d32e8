//! The mail relay collaborator.

use std::collections::BTreeMap;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{
        Mailbox, MultiPart, SinglePart,
        header::{HeaderName, HeaderValue},
    },
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use mailer_common::{config::RelayConfig, internal, outgoing};

use crate::{EmailCommand, RelayError, template::RenderedBodies};

/// Headers the message builder sets itself; request headers with these
/// names are not copied onto the message.
const RESERVED_HEADERS: [&str; 6] = ["to", "from", "cc", "bcc", "subject", "content-type"];

/// A fully rendered message, ready for the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub from: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    /// Additional headers, lowercase names.
    pub headers: BTreeMap<String, String>,
    pub text: Option<String>,
    pub html: Option<String>,
}

impl OutgoingMessage {
    /// Assemble the message for `command` from its rendered bodies.
    ///
    /// The subject is the `subject` header, else the `subject` param, else
    /// `default_subject`. A locale is carried as `Content-Language` unless
    /// the request already set that header.
    #[must_use]
    pub fn new(command: &EmailCommand, bodies: RenderedBodies, default_subject: &str) -> Self {
        let subject = command
            .header("subject")
            .or_else(|| command.param("subject"))
            .unwrap_or(default_subject)
            .to_string();

        let mut headers: BTreeMap<String, String> = command
            .headers()
            .iter()
            .filter(|(name, _)| !RESERVED_HEADERS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if let Some(locale) = command.locale() {
            headers
                .entry("content-language".to_string())
                .or_insert_with(|| locale.to_string());
        }

        Self {
            to: command.to().to_string(),
            from: command.from().to_string(),
            cc: command.cc().map(str::to_string),
            bcc: command.bcc().map(str::to_string),
            subject,
            headers,
            text: bodies.text,
            html: bodies.html,
        }
    }

    /// Build the wire message.
    ///
    /// # Errors
    /// If an address does not parse, or a header name is not valid ASCII
    pub fn build(&self) -> Result<Message, RelayError> {
        let mut builder = Message::builder()
            .from(parse_mailbox("from", &self.from)?)
            .subject(self.subject.clone());

        for mailbox in parse_mailboxes("to", &self.to)? {
            builder = builder.to(mailbox);
        }
        for mailbox in parse_mailboxes("cc", self.cc.as_deref().unwrap_or_default())? {
            builder = builder.cc(mailbox);
        }
        for mailbox in parse_mailboxes("bcc", self.bcc.as_deref().unwrap_or_default())? {
            builder = builder.bcc(mailbox);
        }

        for (name, value) in &self.headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| RelayError::Build(format!("header {name}: {e}")))?;
            builder = builder.raw_header(HeaderValue::new(name, value.clone()));
        }

        match (&self.text, &self.html) {
            (Some(text), Some(html)) => builder.multipart(MultiPart::alternative_plain_html(
                text.clone(),
                html.clone(),
            )),
            (Some(text), None) => builder.singlepart(SinglePart::plain(text.clone())),
            (None, Some(html)) => builder.singlepart(SinglePart::html(html.clone())),
            (None, None) => builder.body(String::new()),
        }
        .map_err(|e| RelayError::Build(e.to_string()))
    }
}

fn parse_mailbox(field: &'static str, address: &str) -> Result<Mailbox, RelayError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| RelayError::InvalidAddress {
            field,
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn parse_mailboxes(field: &'static str, addresses: &str) -> Result<Vec<Mailbox>, RelayError> {
    addresses
        .split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(|address| parse_mailbox(field, address))
        .collect()
}

/// Hands rendered messages to a mail server.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Submit one message.
    ///
    /// # Errors
    /// If the message cannot be built or the server refuses it
    async fn send(&self, message: &OutgoingMessage) -> Result<(), RelayError>;
}

/// How the relay connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS).
    Wrapper,
    /// STARTTLS must succeed before anything else is sent.
    Required,
    /// STARTTLS when the server offers it, plaintext otherwise.
    Opportunistic,
}

impl TlsMode {
    const SUBMISSIONS_PORT: u16 = 465;

    /// Port 465 speaks TLS immediately. Elsewhere STARTTLS is used when
    /// offered, and is mandatory once credentials are involved so they
    /// never cross the wire in the clear.
    #[must_use]
    pub const fn for_server(port: u16, authenticated: bool) -> Self {
        if port == Self::SUBMISSIONS_PORT {
            Self::Wrapper
        } else if authenticated {
            Self::Required
        } else {
            Self::Opportunistic
        }
    }

    fn into_tls(self, host: &str) -> Result<Tls, RelayError> {
        let parameters =
            TlsParameters::new(host.to_string()).map_err(|e| RelayError::Tls(e.to_string()))?;

        Ok(match self {
            Self::Wrapper => Tls::Wrapper(parameters),
            Self::Required => Tls::Required(parameters),
            Self::Opportunistic => Tls::Opportunistic(parameters),
        })
    }
}

/// SMTP relay client.
///
/// Built once at startup and shared by every dispatch task.
pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    server: String,
    tls: TlsMode,
}

impl SmtpRelay {
    /// Build a client for the configured relay.
    ///
    /// Credentials are used when a user is configured; otherwise the relay
    /// is used anonymously. See [`TlsMode::for_server`] for how the
    /// connection is secured.
    ///
    /// # Errors
    /// If the TLS parameters for the relay host cannot be built
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let host = config.server.host.as_str();
        let port = config.server.port_or_default();
        let credentials = config
            .authentication
            .as_ref()
            .filter(|auth| !auth.user.is_empty())
            .map(|auth| Credentials::new(auth.user.clone(), auth.password.clone()));

        let tls = TlsMode::for_server(port, credentials.is_some());
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .tls(tls.into_tls(host)?);

        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }

        let server = format!("{host}:{port}");
        internal!(level = INFO, tls = ?tls, "Using SMTP relay {server}");

        Ok(Self {
            transport: builder.build(),
            server,
            tls,
        })
    }

    #[must_use]
    pub const fn tls(&self) -> TlsMode {
        self.tls
    }
}

impl std::fmt::Debug for SmtpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpRelay")
            .field("server", &self.server)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), RelayError> {
        let email = message.build()?;

        outgoing!(
            level = DEBUG,
            to = %message.to,
            subject = %message.subject,
            "Relaying message via {}",
            self.server
        );

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

//! Per-call session options.

use std::sync::Arc;

use multisession_core::{MessageUpdated, ReceivedMessage};

/// Callback without a payload.
pub type Hook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Callback receiving a payload.
pub type PayloadHook<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Callback receiving a QR payload.
pub type QrHook = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

/// Options for starting a session.
///
/// The callbacks fire for this session only, in addition to the listeners of
/// the callback registry.
#[derive(Clone)]
pub struct StartOptions {
    /// Render QR payloads on the terminal
    pub print_qr: bool,
    /// Called with each new QR payload
    pub on_qr_updated: Option<QrHook>,
    /// Called when a connection attempt starts
    pub on_connecting: Option<Hook>,
    /// Called when the connection opens
    pub on_connected: Option<Hook>,
    /// Called when the session ends for good
    pub on_disconnected: Option<Hook>,
    /// Called for each received message
    pub on_message_received: Option<PayloadHook<ReceivedMessage>>,
    /// Called for each message status update
    pub on_message_updated: Option<PayloadHook<MessageUpdated>>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            print_qr: true,
            on_qr_updated: None,
            on_connecting: None,
            on_connected: None,
            on_disconnected: None,
            on_message_received: None,
            on_message_updated: None,
        }
    }
}

impl StartOptions {
    /// Interactive defaults: QR printed, no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-interactive: no QR printing and no per-call callbacks.
    pub fn silent() -> Self {
        Self {
            print_qr: false,
            ..Self::default()
        }
    }

    /// Set whether QR payloads are printed.
    pub fn print_qr(mut self, print_qr: bool) -> Self {
        self.print_qr = print_qr;
        self
    }

    /// Set the QR callback.
    pub fn on_qr_updated<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_qr_updated = Some(Arc::new(hook));
        self
    }

    /// Set the connecting callback.
    pub fn on_connecting<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_connecting = Some(Arc::new(hook));
        self
    }

    /// Set the connected callback.
    pub fn on_connected<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_connected = Some(Arc::new(hook));
        self
    }

    /// Set the disconnected callback.
    pub fn on_disconnected<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_disconnected = Some(Arc::new(hook));
        self
    }

    /// Set the message-received callback.
    pub fn on_message_received<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ReceivedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_message_received = Some(Arc::new(hook));
        self
    }

    /// Set the message-updated callback.
    pub fn on_message_updated<F>(mut self, hook: F) -> Self
    where
        F: Fn(&MessageUpdated) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_message_updated = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartOptions")
            .field("print_qr", &self.print_qr)
            .field("on_qr_updated", &self.on_qr_updated.is_some())
            .field("on_connecting", &self.on_connecting.is_some())
            .field("on_connected", &self.on_connected.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .field("on_message_received", &self.on_message_received.is_some())
            .field("on_message_updated", &self.on_message_updated.is_some())
            .finish()
    }
}

/// Options for pairing a session with a phone number instead of a QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCodeOptions {
    /// Phone number in international format, digits only
    pub phone_number: String,
}

impl PairingCodeOptions {
    /// Pair with `phone_number`.
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
        }
    }
}

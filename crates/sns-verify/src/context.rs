//! Variables shared with the host message pipeline.

use std::collections::HashMap;

/// Well-known input variables.
pub mod vars {
    /// Header carrying the SNS message type.
    pub const MESSAGE_TYPE_HEADER: &str = "request.header.x-amz-sns-message-type";
    /// Raw request body.
    pub const REQUEST_CONTENT: &str = "request.content";
    /// Prefix under which accepted notification fields are published.
    pub const NOTIFICATION_PREFIX: &str = "notification.";
}

/// Per-message variable scope provided by the host pipeline.
///
/// One context belongs to one in-flight message. It may move between worker
/// threads while a verification is suspended on a certificate fetch.
pub trait MessageContext: Send {
    fn get_variable(&self, name: &str) -> Option<String>;

    fn set_variable(&mut self, name: &str, value: String);

    fn remove_variable(&mut self, name: &str);
}

/// `HashMap`-backed context for hosts without their own variable store, and for tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryContext {
    variables: HashMap<String, String>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for one inbound request: message-type header plus body.
    pub fn for_request(message_type: Option<&str>, body: &str) -> Self {
        let mut ctx = Self::new();
        if let Some(message_type) = message_type {
            ctx.set_variable(vars::MESSAGE_TYPE_HEADER, message_type.to_string());
        }
        ctx.set_variable(vars::REQUEST_CONTENT, body.to_string());
        ctx
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }
}

impl MessageContext for InMemoryContext {
    fn get_variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: String) {
        self.variables.insert(name.to_string(), value);
    }

    fn remove_variable(&mut self, name: &str) {
        self.variables.remove(name);
    }
}

//! Canonical string-to-sign for SNS messages.
//!
//! Each signed field contributes `<Name>\n<value>\n`, in the fixed order the
//! signer used. The order is part of the wire protocol and must never be re-sorted.

use crate::types::{fields, MessageType, NotificationMessage};

/// Fields signed for `Notification` messages. `Subject` is included only when present.
const NOTIFICATION_FIELDS: &[(&str, bool)] = &[
    (fields::MESSAGE, true),
    (fields::MESSAGE_ID, true),
    (fields::SUBJECT, false),
    (fields::TIMESTAMP, true),
    (fields::TOPIC_ARN, true),
    (fields::TYPE, true),
];

/// Fields signed for `SubscriptionConfirmation` and `UnsubscribeConfirmation` messages.
const SUBSCRIPTION_FIELDS: &[(&str, bool)] = &[
    (fields::MESSAGE, true),
    (fields::MESSAGE_ID, true),
    (fields::SUBSCRIBE_URL, true),
    (fields::TIMESTAMP, true),
    (fields::TOKEN, true),
    (fields::TOPIC_ARN, true),
    (fields::TYPE, true),
];

/// Signed fields for a message type, or `None` when the type is not signable.
pub fn signed_fields(message_type: MessageType) -> Option<&'static [(&'static str, bool)]> {
    match message_type {
        MessageType::Notification => Some(NOTIFICATION_FIELDS),
        MessageType::SubscriptionConfirmation | MessageType::UnsubscribeConfirmation => {
            Some(SUBSCRIPTION_FIELDS)
        }
        MessageType::Unknown => None,
    }
}

/// Build the canonical string-to-sign.
///
/// Returns `None` for [`MessageType::Unknown`], and when a field the template
/// requires is absent. Callers must treat `None` as a verification failure.
///
/// An optional field that is present with an empty value still emits its block.
pub fn string_to_sign(message_type: MessageType, message: &NotificationMessage) -> Option<String> {
    let template = signed_fields(message_type)?;

    let mut out = String::new();
    for &(name, required) in template {
        match message.get(name) {
            Some(value) => {
                out.push_str(name);
                out.push('\n');
                out.push_str(value);
                out.push('\n');
            }
            None if required => return None,
            None => {}
        }
    }
    Some(out)
}

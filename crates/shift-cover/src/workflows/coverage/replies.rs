use super::domain::ResponseType;

const ACCEPT_WORDS: [&str; 5] = ["YES", "Y", "ACCEPT", "1", "OK"];
const DECLINE_WORDS: [&str; 5] = ["NO", "N", "DECLINE", "2", "NOPE"];

/// Free-text reply that matched neither keyword list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not understand reply '{text}'; answer YES to accept or NO to decline")]
pub struct ReplyParseError {
    pub text: String,
}

/// Classify a staff reply to a shift offer.
pub fn parse_reply(text: &str) -> Result<ResponseType, ReplyParseError> {
    let normalized = text.trim().to_ascii_uppercase();

    if ACCEPT_WORDS.contains(&normalized.as_str()) {
        Ok(ResponseType::Accept)
    } else if DECLINE_WORDS.contains(&normalized.as_str()) {
        Ok(ResponseType::Decline)
    } else {
        Err(ReplyParseError {
            text: text.trim().to_string(),
        })
    }
}

use std::fmt::Display;

use console::{style, StyledObject};

use crate::fetch::FetchOutcome;

pub fn dim(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn bright(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn cyan(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn magenta_bold(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Work in progress, and counts in summaries.
pub fn pending(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn success(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().green()
}

pub fn failure(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().red()
}

/// Why fetching stopped. Hitting the page limit is highlighted, since older
/// matching builds may have been left unread.
pub fn outcome(outcome: FetchOutcome) -> StyledObject<String> {
    match outcome {
        FetchOutcome::Resident => success("used loaded builds"),
        FetchOutcome::Satisfied => success("enough results"),
        FetchOutcome::Exhausted => success("no further results"),
        FetchOutcome::LimitReached => pending("max fetches reached"),
    }
}

//! Parsing of terminal input lines.

use std::fmt;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignUp {
        email: String,
        password: String,
        display_name: String,
    },
    SignIn {
        email: String,
        password: String,
    },
    SignOut,
    Contacts,
    Refresh,
    /// Select the n-th contact (1-based).
    Open(usize),
    Close,
    Reopen,
    /// Edit the n-th visible message (1-based).
    Edit(usize, String),
    /// Delete the n-th visible message (1-based).
    Delete(usize),
    Send(String),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub usage: &'static str,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usage: {}", self.usage)
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
/signup <email> <password> [display name]
/signin <email> <password>
/signout
/contacts            list contacts
/refresh             re-read contacts once
/open <n>            chat with contact n
/close               leave the conversation
/reopen              resubscribe an interrupted conversation
/edit <n> <text>     edit your message n
/delete <n>          delete your message n
/quit
anything else        send to the open conversation";

fn index(arg: Option<&str>, usage: &'static str) -> Result<usize, ParseError> {
    arg.and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .ok_or(ParseError { usage })
}

impl Command {
    /// Parses one input line. Returns `Ok(None)` for blank lines.
    ///
    /// # Errors
    ///
    /// Returns the command's usage if its arguments are malformed.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if !line.starts_with('/') {
            return Ok(Some(Self::Send(line.to_string())));
        }

        let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let command = match name {
            "/signup" => {
                const USAGE: &str = "/signup <email> <password> [display name]";
                let mut parts = rest.splitn(3, ' ');
                let email = parts.next().filter(|s| !s.is_empty());
                let password = parts.next();
                match (email, password) {
                    (Some(email), Some(password)) => Self::SignUp {
                        email: email.to_string(),
                        password: password.to_string(),
                        display_name: parts.next().unwrap_or_default().trim().to_string(),
                    },
                    _ => return Err(ParseError { usage: USAGE }),
                }
            }
            "/signin" => {
                const USAGE: &str = "/signin <email> <password>";
                match rest.split_once(' ') {
                    Some((email, password)) if !password.trim().is_empty() => Self::SignIn {
                        email: email.to_string(),
                        password: password.trim().to_string(),
                    },
                    _ => return Err(ParseError { usage: USAGE }),
                }
            }
            "/signout" => Self::SignOut,
            "/contacts" => Self::Contacts,
            "/refresh" => Self::Refresh,
            "/open" => Self::Open(index(Some(rest), "/open <n>")?),
            "/close" => Self::Close,
            "/reopen" => Self::Reopen,
            "/edit" => {
                const USAGE: &str = "/edit <n> <text>";
                let (n, text) = rest.split_once(' ').ok_or(ParseError { usage: USAGE })?;
                Self::Edit(index(Some(n), USAGE)?, text.trim().to_string())
            }
            "/delete" => Self::Delete(index(Some(rest), "/delete <n>")?),
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            _ => return Err(ParseError { usage: "/help" }),
        };
        Ok(Some(command))
    }
}

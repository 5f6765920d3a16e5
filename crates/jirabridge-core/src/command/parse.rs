//! Tokenizing `/<trigger> ...` command text into an [`Action`].

const INSTANCE_FLAG: &str = "--instance";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Help,
    /// `install <type> <url>`, arguments unchecked.
    Install(Vec<String>),
    Uninstall(Vec<String>),
    /// `settings ...` and `instance settings ...`
    Settings(Vec<String>),
    InstanceList,
    InstanceOAuth(Vec<String>),
    Assign(Vec<String>),
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub action: Action,
    /// Value of `--instance`, from any position.
    pub instance: Option<String>,
}

/// Returns `None` when the text is not addressed to `trigger`.
pub fn parse_command(text: &str, trigger: &str) -> Option<ParsedCommand> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next()?;
    let name = head.strip_prefix('/')?;
    if !name.eq_ignore_ascii_case(trigger) {
        return None;
    }

    let mut instance = None;
    let mut args: Vec<String> = Vec::new();
    while let Some(token) = tokens.next() {
        if token == INSTANCE_FLAG {
            match tokens.next() {
                Some(value) => instance = Some(value.to_string()),
                None => {
                    return Some(ParsedCommand {
                        action: Action::Help,
                        instance: None,
                    })
                }
            }
        } else if let Some(value) = token.strip_prefix("--instance=") {
            instance = Some(value.to_string());
        } else {
            args.push(token.to_string());
        }
    }

    Some(ParsedCommand {
        action: classify(args),
        instance,
    })
}

fn classify(mut args: Vec<String>) -> Action {
    if args.is_empty() {
        return Action::Help;
    }
    let verb = args.remove(0).to_lowercase();
    match verb.as_str() {
        "install" => Action::Install(args),
        "uninstall" => Action::Uninstall(args),
        "settings" => Action::Settings(args),
        "assign" => Action::Assign(args),
        "connect" => Action::Connect,
        "disconnect" => Action::Disconnect,
        "instance" => {
            if args.is_empty() {
                return Action::Help;
            }
            let sub = args.remove(0).to_lowercase();
            match sub.as_str() {
                "settings" => Action::Settings(args),
                "list" => Action::InstanceList,
                "oauth" => Action::InstanceOAuth(args),
                _ => Action::Help,
            }
        }
        _ => Action::Help,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkCommand {
    Noop,
    Next,
    Back,
    Goto(String),
    Regenerate,
    Versions,
    Select(usize),
    Concept(usize),
    Status,
    Help,
    Quit,
    Unknown { command: String },
}

pub struct WalkCommandSpec {
    pub command: &'static str,
    pub help: &'static str,
}

pub const WALK_COMMANDS: &[WalkCommandSpec] = &[
    WalkCommandSpec {
        command: "next",
        help: "advance to the next step (gated on the current asset)",
    },
    WalkCommandSpec {
        command: "back",
        help: "return to the previous step",
    },
    WalkCommandSpec {
        command: "goto <step>",
        help: "jump to a step by name or number",
    },
    WalkCommandSpec {
        command: "regen",
        help: "regenerate the current step's asset",
    },
    WalkCommandSpec {
        command: "versions",
        help: "list saved versions of the current hero asset",
    },
    WalkCommandSpec {
        command: "select <n>",
        help: "make version <n> the active one",
    },
    WalkCommandSpec {
        command: "concept <n>",
        help: "switch to concept <n> (restarts at step 1)",
    },
    WalkCommandSpec {
        command: "status",
        help: "show per-step readiness",
    },
    WalkCommandSpec {
        command: "help",
        help: "show this list",
    },
    WalkCommandSpec {
        command: "quit",
        help: "leave the walk",
    },
];

pub fn parse_walk_command(text: &str) -> WalkCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return WalkCommand::Noop;
    }
    let stripped = trimmed.strip_prefix('/').unwrap_or(trimmed);

    let parts = match shell_words::split(stripped) {
        Ok(parts) => parts,
        Err(_) => stripped.split_whitespace().map(str::to_string).collect(),
    };
    let Some(head) = parts.first() else {
        return WalkCommand::Noop;
    };
    let command = head.to_ascii_lowercase();
    let arg = parts.get(1).map(String::as_str).unwrap_or("");

    match command.as_str() {
        "next" | "n" => WalkCommand::Next,
        "back" | "b" | "prev" => WalkCommand::Back,
        "goto" | "jump" => WalkCommand::Goto(arg.to_string()),
        "regen" | "regenerate" | "retry" => WalkCommand::Regenerate,
        "versions" | "history" => WalkCommand::Versions,
        "select" => match arg.parse::<usize>() {
            Ok(index) => WalkCommand::Select(index),
            Err(_) => WalkCommand::Unknown {
                command: trimmed.to_string(),
            },
        },
        "concept" => match arg.parse::<usize>() {
            Ok(index) => WalkCommand::Concept(index),
            Err(_) => WalkCommand::Unknown {
                command: trimmed.to_string(),
            },
        },
        "status" => WalkCommand::Status,
        "help" | "?" => WalkCommand::Help,
        "quit" | "exit" | "q" => WalkCommand::Quit,
        _ => WalkCommand::Unknown {
            command: trimmed.to_string(),
        },
    }
}

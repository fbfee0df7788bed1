//! Separates configuration flags from the lifecycle command word.
//!
//! Configuration flags must precede the command. Everything from the first
//! token that is not a recognised configuration flag onwards is treated as
//! the command and its arguments.

use std::ffi::{OsStr, OsString};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Value,
    Switch,
}

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `peon_config::Config`.
const CONFIG_CLI_FLAGS: &[(&str, Arity)] = &[
    ("--config-path", Arity::Value),
    ("--log-file", Arity::Value),
    ("--pid-dir", Arity::Value),
    ("--pid-name", Arity::Value),
    ("--stdin", Arity::Value),
    ("--stdout", Arity::Value),
    ("--stderr", Arity::Value),
    ("--port", Arity::Value),
    ("--log-filter", Arity::Value),
    ("--log-format", Arity::Value),
    ("--work-dir", Arity::Value),
    ("--stop-interval-ms", Arity::Value),
    ("--stop-timeout-ms", Arity::Value),
    ("--silent", Arity::Switch),
    ("--debug", Arity::Switch),
    ("--stop-escalate", Arity::Switch),
    ("--probe-status", Arity::Switch),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn process_config_flag(argument: &OsStr) -> FlagAction {
    let argument_text = argument.to_string_lossy();
    if !argument_text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, has_inline_value) = match argument_text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (argument_text.as_ref(), false),
    };
    match CONFIG_CLI_FLAGS.iter().find(|(known, _)| *known == flag) {
        Some((_, Arity::Value)) => FlagAction::Include {
            needs_value: !has_inline_value,
        },
        Some((_, Arity::Switch)) => FlagAction::Include { needs_value: false },
        None => FlagAction::Stop,
    }
}

/// Arguments destined for the configuration loader plus the command position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the configuration flags and their values.
    pub(crate) config_arguments: Vec<OsString>,
    /// Index of the first command token in the original arguments.
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut pending_value = false;
    let mut consumed = 0usize;
    for argument in rest {
        if pending_value {
            config_arguments.push(argument.clone());
            pending_value = false;
            consumed += 1;
            continue;
        }
        match process_config_flag(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                pending_value = needs_value;
                consumed += 1;
            }
            FlagAction::Stop => break,
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start: consumed + 1,
    }
}

/// Rebuilds the argument list the command parser sees: the program name
/// followed by every token from the command onwards.
pub(crate) fn command_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let program = args.first().into_iter();
    let command = args.get(split.command_start..).unwrap_or_default().iter();
    program.chain(command).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn os(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case::inline_value("--pid-dir=/run/peon", FlagAction::Include { needs_value: false })]
    #[case::separate_value("--pid-dir", FlagAction::Include { needs_value: true })]
    #[case::switch("--silent", FlagAction::Include { needs_value: false })]
    #[case::command_word("start", FlagAction::Stop)]
    #[case::unknown_flag("--unknown", FlagAction::Stop)]
    fn classifies_arguments(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(process_config_flag(OsStr::new(argument)), expected);
    }

    #[test]
    fn splits_flags_from_command() {
        let args = os(&["peond", "--silent", "--port", "9000", "--log-file=/tmp/x.log", "stop"]);
        let split = split_config_arguments(&args);
        assert_eq!(
            split.config_arguments,
            os(&["peond", "--silent", "--port", "9000", "--log-file=/tmp/x.log"])
        );
        assert_eq!(split.command_start, 5);
    }

    #[test]
    fn flags_after_the_command_are_not_configuration() {
        let args = os(&["peond", "status", "--silent"]);
        let split = split_config_arguments(&args);
        assert_eq!(split.config_arguments, os(&["peond"]));
        assert_eq!(split.command_start, 1);
    }

    #[test]
    fn command_arguments_keep_program_name() {
        let args = os(&["peond", "--pid-dir", "/run/peon", "restart"]);
        let split = split_config_arguments(&args);
        assert_eq!(command_arguments(&args, &split), os(&["peond", "restart"]));
    }

    #[test]
    fn empty_arguments_split_cleanly() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert_eq!(split.command_start, 0);
    }
}

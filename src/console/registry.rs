//! Named console commands and line dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::error::CommandError;

/// What a command sees while it runs.
pub struct CommandContext<'a> {
    /// Registry the command was looked up in.
    pub registry: &'a CommandRegistry,
    /// Console output.
    pub out: &'a mut dyn Write,
}

impl fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// A console command.
pub trait Command: Send + Sync {
    /// Name typed at the prompt.
    fn name(&self) -> &str;

    /// One-line description shown by `help`.
    fn help(&self) -> &str;

    /// Argument synopsis shown after the name, e.g. `<key> [value]`.
    fn hint(&self) -> Option<&str> {
        None
    }

    /// Runs the command; `args` excludes the command name.
    ///
    /// Returns a status code, 0 for success.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidArguments`] when `args` do not parse.
    fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> Result<i32, CommandError>;
}

/// Commands indexed by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
    max_args: Option<usize>,
}

impl CommandRegistry {
    /// Creates an empty registry with no argument limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry rejecting lines with more than
    /// `max_args` words, command name included.
    #[must_use]
    pub fn with_max_args(max_args: usize) -> Self {
        Self {
            commands: BTreeMap::new(),
            max_args: Some(max_args),
        }
    }

    /// Adds a command, replacing any with the same name.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_string();
        if self.commands.insert(name.clone(), command).is_some() {
            tracing::debug!(command = %name, "console command replaced");
        }
    }

    /// Looks up a command by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    /// Registered commands in name order.
    pub fn commands(&self) -> impl Iterator<Item = &Arc<dyn Command>> {
        self.commands.values()
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no command is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Command names starting with `prefix`, in name order.
    #[must_use]
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        self.commands
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Splits `line` and runs the named command.
    ///
    /// A blank line runs nothing and succeeds.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotFound`] for an unknown name,
    /// [`CommandError::InvalidArguments`] if the line or the arguments do
    /// not parse, [`CommandError::Failed`] for a non-zero status.
    pub fn dispatch(&self, line: &str, out: &mut dyn Write) -> Result<(), CommandError> {
        let argv = split_args(line, self.max_args)?;
        let Some((name, args)) = argv.split_first() else {
            return Ok(());
        };
        let command = self
            .commands
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| CommandError::NotFound(name.clone()))?;
        let mut ctx = CommandContext {
            registry: self,
            out,
        };
        match command.run(args, &mut ctx)? {
            0 => Ok(()),
            code => Err(CommandError::failed(code)),
        }
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("max_args", &self.max_args)
            .finish()
    }
}

/// Splits a command line into words.
///
/// Words are separated by whitespace. Double quotes group words,
/// a backslash takes the next character literally.
///
/// # Errors
///
/// [`CommandError::InvalidArguments`] for an unterminated quote, a
/// trailing backslash, or more than `max_args` words.
pub fn split_args(line: &str, max_args: Option<usize>) -> Result<Vec<String>, CommandError> {
    let invalid = |message: &str| CommandError::InvalidArguments {
        command: String::new(),
        message: message.to_string(),
    };

    let mut argv = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(|| invalid("trailing backslash"))?;
                word.push(escaped);
                in_word = true;
            }
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    argv.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if quoted {
        return Err(invalid("unterminated quote"));
    }
    if in_word {
        argv.push(word);
    }
    if let Some(max) = max_args
        && argv.len() > max
    {
        return Err(invalid(&format!("too many arguments (max {max})")));
    }
    Ok(argv)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::console::status;

    #[derive(Debug)]
    struct Echo;

    impl Command for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn help(&self) -> &str {
            "Print arguments"
        }

        fn hint(&self) -> Option<&str> {
            Some("[text...]")
        }

        fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> Result<i32, CommandError> {
            if args.first().is_some_and(|a| a == "--bad") {
                return Err(CommandError::InvalidArguments {
                    command: "echo".into(),
                    message: "unknown option '--bad'".into(),
                });
            }
            if args.first().is_some_and(|a| a == "fail") {
                return Ok(status::INVALID_STATE);
            }
            match writeln!(ctx.out, "{}", args.join(" ")) {
                Ok(()) => Ok(0),
                Err(_) => Ok(status::FAIL),
            }
        }
    }

    fn registry() -> CommandRegistry {
        let mut reg = CommandRegistry::with_max_args(4);
        reg.register(Arc::new(Echo));
        reg
    }

    #[test]
    fn split_handles_quotes_and_escapes() {
        let Ok(argv) = split_args(r#"set "a b" c\ d  e"#, None) else {
            panic!("split failed");
        };
        assert_eq!(argv, vec!["set", "a b", "c d", "e"]);
    }

    #[test]
    fn split_rejects_unterminated_quote() {
        assert!(matches!(
            split_args("echo \"abc", None),
            Err(CommandError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn split_enforces_max_args() {
        assert!(split_args("a b c", Some(3)).is_ok());
        assert!(split_args("a b c d", Some(3)).is_err());
    }

    #[test]
    fn empty_quotes_make_an_empty_word() {
        let Ok(argv) = split_args(r#"echo """#, None) else {
            panic!("split failed");
        };
        assert_eq!(argv, vec!["echo", ""]);
    }

    #[test]
    fn dispatch_runs_command() {
        let reg = registry();
        let mut out = Vec::new();
        assert!(reg.dispatch("echo hello world", &mut out).is_ok());
        assert_eq!(out, b"hello world\n");
    }

    #[test]
    fn dispatch_outcomes_are_distinct() {
        let reg = registry();
        let mut out = Vec::new();
        assert_eq!(
            reg.dispatch("nope 1", &mut out),
            Err(CommandError::NotFound("nope".into()))
        );
        assert!(matches!(
            reg.dispatch("echo --bad", &mut out),
            Err(CommandError::InvalidArguments { .. })
        ));
        assert_eq!(
            reg.dispatch("echo fail", &mut out),
            Err(CommandError::failed(status::INVALID_STATE))
        );
        let Err(unterminated) = reg.dispatch("echo \"open", &mut out) else {
            panic!("unterminated quote accepted");
        };
        assert_eq!(unterminated.to_string(), "unterminated quote");
        assert!(reg.dispatch("   ", &mut out).is_ok());
        assert!(out.is_empty());
    }

    #[test]
    fn completion_and_hints() {
        let mut reg = registry();
        reg.register(Arc::new(Named("exit")));
        reg.register(Arc::new(Named("exec")));
        assert_eq!(reg.complete("ex"), vec!["exec", "exit"]);
        assert_eq!(reg.complete("ec"), vec!["echo"]);
        assert!(reg.complete("z").is_empty());
        assert_eq!(reg.get("echo").and_then(|c| c.hint()), Some("[text...]"));
    }

    struct Named(&'static str);

    impl Command for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn help(&self) -> &str {
            ""
        }

        fn run(&self, _args: &[String], _ctx: &mut CommandContext<'_>) -> Result<i32, CommandError> {
            Ok(0)
        }
    }
}

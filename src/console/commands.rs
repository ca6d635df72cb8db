//! Built-in console commands.

use std::sync::Arc;

use super::registry::{Command, CommandContext, CommandRegistry};
use super::status;
use crate::client::Connection;
use crate::error::CommandError;

/// Lists registered commands with their synopsis and help text.
#[derive(Debug, Default)]
pub struct HelpCommand;

impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn help(&self) -> &str {
        "Print the list of registered commands"
    }

    fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> Result<i32, CommandError> {
        if let Some(extra) = args.first() {
            return Err(CommandError::InvalidArguments {
                command: self.name().to_string(),
                message: format!("unexpected argument '{extra}'"),
            });
        }
        for command in ctx.registry.commands() {
            let written = match command.hint() {
                Some(hint) => writeln!(ctx.out, "{} {hint}", command.name()),
                None => writeln!(ctx.out, "{}", command.name()),
            }
            .and_then(|()| writeln!(ctx.out, "  {}\n", command.help()));
            if written.is_err() {
                return Ok(status::FAIL);
            }
        }
        Ok(0)
    }
}

/// Prints the bridge version.
#[derive(Debug, Default)]
pub struct VersionCommand;

impl Command for VersionCommand {
    fn name(&self) -> &str {
        "version"
    }

    fn help(&self) -> &str {
        "Print the bridge version"
    }

    fn run(&self, _args: &[String], ctx: &mut CommandContext<'_>) -> Result<i32, CommandError> {
        match writeln!(ctx.out, "{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")) {
            Ok(()) => Ok(0),
            Err(_) => Ok(status::FAIL),
        }
    }
}

/// Prints the connection status as JSON.
#[derive(Debug)]
pub struct StatusCommand {
    connection: Arc<Connection>,
}

impl StatusCommand {
    /// Reports on `connection`.
    #[must_use]
    pub const fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

impl Command for StatusCommand {
    fn name(&self) -> &str {
        "status"
    }

    fn help(&self) -> &str {
        "Print the WebSocket connection status"
    }

    fn hint(&self) -> Option<&str> {
        Some("[--pretty]")
    }

    fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> Result<i32, CommandError> {
        let pretty = match args {
            [] => false,
            [flag] if flag == "--pretty" => true,
            _ => {
                return Err(CommandError::InvalidArguments {
                    command: self.name().to_string(),
                    message: "usage: status [--pretty]".to_string(),
                });
            }
        };
        let snapshot = self.connection.status();
        let rendered = if pretty {
            serde_json::to_string_pretty(&snapshot)
        } else {
            serde_json::to_string(&snapshot)
        };
        let Ok(json) = rendered else {
            return Ok(status::FAIL);
        };
        match writeln!(ctx.out, "{json}") {
            Ok(()) => Ok(0),
            Err(_) => Ok(status::FAIL),
        }
    }
}

/// Registers `help`, `version` and, given a connection, `status`.
pub fn register_builtins(registry: &mut CommandRegistry, connection: Option<Arc<Connection>>) {
    registry.register(Arc::new(HelpCommand));
    registry.register(Arc::new(VersionCommand));
    if let Some(connection) = connection {
        registry.register(Arc::new(StatusCommand::new(connection)));
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::domain::EventDispatcher;

    fn connection() -> Arc<Connection> {
        let config = ConnectionConfig {
            uri: "ws://127.0.0.1:9".to_string(),
            ..ConnectionConfig::default()
        };
        Arc::new(Connection::new(config, EventDispatcher::new()))
    }

    fn registry() -> CommandRegistry {
        let mut reg = CommandRegistry::new();
        register_builtins(&mut reg, Some(connection()));
        reg
    }

    #[test]
    fn help_lists_every_command() {
        let reg = registry();
        let mut out = Vec::new();
        assert!(reg.dispatch("help", &mut out).is_ok());
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("help\n"));
        assert!(text.contains("status [--pretty]\n"));
        assert!(text.contains("version\n"));
    }

    #[test]
    fn help_rejects_arguments() {
        let reg = registry();
        let mut out = Vec::new();
        assert!(matches!(
            reg.dispatch("help me", &mut out),
            Err(CommandError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn version_prints_package_version() {
        let reg = registry();
        let mut out = Vec::new();
        assert!(reg.dispatch("version", &mut out).is_ok());
        assert!(String::from_utf8_lossy(&out).contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn status_renders_json() {
        let reg = registry();
        let mut out = Vec::new();
        assert!(reg.dispatch("status", &mut out).is_ok());
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&out) else {
            panic!("status output is not JSON");
        };
        assert_eq!(value.get("state").and_then(|s| s.as_str()), Some("disconnected"));
        assert_eq!(value.get("uri").and_then(|s| s.as_str()), Some("ws://127.0.0.1:9"));
    }

    #[test]
    fn status_rejects_unknown_flag() {
        let reg = registry();
        let mut out = Vec::new();
        assert!(matches!(
            reg.dispatch("status --loud", &mut out),
            Err(CommandError::InvalidArguments { .. })
        ));
    }
}

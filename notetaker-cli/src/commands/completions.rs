//! Shell completion generation.

use {
    crate::Cli,
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    std::io,
};

/// Write the completion script for `shell` to `out`.
fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd
        .get_name()
        .to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_completions_bash() {
        let output = render(Shell::Bash);
        assert!(output.contains("_notetaker()"));
        assert!(output.contains("list-devices"));
    }

    #[test]
    fn test_completions_zsh() {
        assert!(render(Shell::Zsh).contains("#compdef notetaker"));
    }

    #[test]
    fn test_completions_fish() {
        assert!(render(Shell::Fish).contains("notetaker"));
    }

    #[test]
    fn test_completions_other_shells_not_empty() {
        assert!(!render(Shell::PowerShell).is_empty());
        assert!(!render(Shell::Elvish).is_empty());
    }
}

//! Rules deciding which commands and tasks count as builds.

const BUILD_COMMANDS: &[&str] = &[
    "make build",
    "make build-no-cache",
    "npm run build",
    "yarn build",
    "pnpm build",
    "gradle build",
    "mvn build",
    "cargo build",
    "go build",
    "cmake",
];

const BUILD_TASK_WORDS: &[&str] = &["build", "make"];

pub fn is_build_command(command_line: &str) -> bool {
    let line = command_line.to_lowercase();

    BUILD_COMMANDS.iter().any(|pattern| line.contains(pattern)) || has_word(&line, "make")
}

pub fn is_build_task(task_name: &str) -> bool {
    let name = task_name.to_lowercase();
    BUILD_TASK_WORDS.iter().any(|word| name.contains(word))
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_build_commands() {
        for line in &[
            "make build",
            "make build-no-cache",
            "npm run build",
            "yarn build",
            "pnpm build",
            "gradle build",
            "mvn build",
            "cargo build --release",
            "go build ./...",
            "cmake -S . -B out",
            "CARGO BUILD",
        ] {
            assert!(is_build_command(line), "{} should be a build", line);
        }
    }

    #[test]
    fn bare_make_word() {
        assert!(is_build_command("make"));
        assert!(is_build_command("make -j8 all"));
        assert!(is_build_command("cd src && make"));
        assert!(is_build_command("/usr/bin/make install"));
    }

    #[test]
    fn make_inside_other_words_is_not_a_build() {
        assert!(!is_build_command("automake --version"));
        assert!(!is_build_command("cat makefile"));
        assert!(!is_build_command("make_release.sh"));
    }

    #[test]
    fn other_commands_are_not_builds() {
        assert!(!is_build_command("ls -la"));
        assert!(!is_build_command("cargo test"));
        assert!(!is_build_command("npm install"));
        assert!(!is_build_command(""));
    }

    #[test]
    fn task_names() {
        assert!(is_build_task("Build Project"));
        assert!(is_build_task("rebuild-all"));
        assert!(is_build_task("Make docs"));
        assert!(!is_build_task("test"));
        assert!(!is_build_task("lint"));
    }
}

//! Language profiles: which image runs a language and how its command is built.
//!
//! The registry is built once at startup and shared read-only between
//! requests. Source code never becomes part of a shell script. Interpreted
//! languages receive it as an inline script argument, compiled languages run a
//! fixed shell script that reads it from a positional parameter, so shell
//! metacharacters in the source are never parsed by the shell.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::ExecutionError;

/// `$0` for shell pipelines; shows up in shell error messages.
const SHELL_ARG0: &str = "coderun";

const CPP_PIPELINE: &str = r#"printf '%s' "$1" > main.cpp && g++ main.cpp -o main && ./main"#;

const TS_PIPELINE: &str = r#"npm install -g --silent typescript && printf '%s' "$1" > main.ts && tsc main.ts && node main.js"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTemplate {
    /// `<interpreter> <flag> <code>`, e.g. `python -c <code>`.
    InlineScript {
        interpreter: &'static str,
        flag: &'static str,
    },
    /// `sh -c <script> coderun <code>`; the script reads the source from `$1`.
    ShellPipeline { script: &'static str },
}

impl CommandTemplate {
    pub fn build(&self, code: &str) -> Vec<String> {
        match self {
            CommandTemplate::InlineScript { interpreter, flag } => {
                vec![interpreter.to_string(), flag.to_string(), code.to_string()]
            }
            CommandTemplate::ShellPipeline { script } => vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
                SHELL_ARG0.to_string(),
                code.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub identifier: String,
    pub image: String,
    pub template: CommandTemplate,
}

impl LanguageProfile {
    fn new(identifier: &str, image: &str, template: CommandTemplate) -> Self {
        Self {
            identifier: identifier.to_string(),
            image: image.to_string(),
            template,
        }
    }

    /// Argument vector that runs `code` inside this profile's image.
    pub fn command(&self, code: &str) -> Vec<String> {
        self.template.build(code)
    }
}

/// Immutable lookup table from language identifier to profile.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: BTreeMap<String, LanguageProfile>,
}

impl LanguageRegistry {
    /// The four built-in languages: `js`, `python`, `cpp` and `ts`.
    pub fn builtin() -> Self {
        let profiles = [
            LanguageProfile::new(
                "js",
                "node:14",
                CommandTemplate::InlineScript {
                    interpreter: "node",
                    flag: "-e",
                },
            ),
            LanguageProfile::new(
                "python",
                "python:3.9",
                CommandTemplate::InlineScript {
                    interpreter: "python",
                    flag: "-c",
                },
            ),
            LanguageProfile::new(
                "cpp",
                "gcc:latest",
                CommandTemplate::ShellPipeline {
                    script: CPP_PIPELINE,
                },
            ),
            LanguageProfile::new(
                "ts",
                "node:14",
                CommandTemplate::ShellPipeline {
                    script: TS_PIPELINE,
                },
            ),
        ];

        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.identifier.clone(), p))
                .collect(),
        }
    }

    /// Replaces the image of the named languages. Unknown identifiers are
    /// ignored here; [`crate::config::RunnerConfig::validate`] rejects them.
    pub fn with_image_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (language, image) in overrides {
            if let Some(profile) = self.profiles.get_mut(language) {
                log::debug!(
                    "Overriding image for {}: {} -> {}",
                    language,
                    profile.image,
                    image
                );
                profile.image = image.clone();
            }
        }
        self
    }

    pub fn resolve(&self, language: &str) -> Result<&LanguageProfile, ExecutionError> {
        self.profiles
            .get(language)
            .ok_or_else(|| ExecutionError::NotSupported {
                language: language.to_string(),
            })
    }

    pub fn contains(&self, language: &str) -> bool {
        self.profiles.contains_key(language)
    }

    /// Profiles ordered by identifier.
    pub fn profiles(&self) -> impl Iterator<Item = &LanguageProfile> {
        self.profiles.values()
    }

    /// Distinct images referenced by the registry.
    pub fn images(&self) -> BTreeSet<&str> {
        self.profiles.values().map(|p| p.image.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_every_builtin_language() {
        let registry = LanguageRegistry::builtin();
        for (language, image) in [
            ("js", "node:14"),
            ("python", "python:3.9"),
            ("cpp", "gcc:latest"),
            ("ts", "node:14"),
        ] {
            let profile = registry.resolve(language).unwrap();
            assert_eq!(profile.identifier, language);
            assert_eq!(profile.image, image);
        }
    }

    #[test]
    fn test_unknown_language_is_not_supported() {
        let registry = LanguageRegistry::builtin();
        for language in ["ruby", "", "Python", "js ", "c++"] {
            match registry.resolve(language) {
                Err(ExecutionError::NotSupported { language: l }) => assert_eq!(l, language),
                other => panic!("expected NotSupported for {:?}, got {:?}", language, other),
            }
        }
    }

    #[test]
    fn test_inline_script_commands() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(
            registry.resolve("python").unwrap().command("print(1+1)"),
            vec!["python", "-c", "print(1+1)"]
        );
        assert_eq!(
            registry.resolve("js").unwrap().command("console.log('a  b')"),
            vec!["node", "-e", "console.log('a  b')"]
        );
    }

    #[test]
    fn test_shell_pipelines_pass_source_as_positional_argument() {
        let registry = LanguageRegistry::builtin();
        let hostile = "int main(){}\"; rm -rf / #$(reboot)`id`";

        for language in ["cpp", "ts"] {
            let command = registry.resolve(language).unwrap().command(hostile);
            assert_eq!(command.len(), 5);
            assert_eq!(&command[..2], &["sh", "-c"]);
            assert!(!command[2].contains(hostile));
            assert!(command[2].contains(r#""$1""#));
            assert_eq!(command[3], SHELL_ARG0);
            assert_eq!(command[4], hostile);
        }
    }

    #[test]
    fn test_image_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("python".to_string(), "python:3.12-slim".to_string());
        overrides.insert("cobol".to_string(), "cobol:latest".to_string());

        let registry = LanguageRegistry::builtin().with_image_overrides(&overrides);
        assert_eq!(registry.resolve("python").unwrap().image, "python:3.12-slim");
        assert!(!registry.contains("cobol"));
    }

    #[test]
    fn test_images_are_deduplicated() {
        let registry = LanguageRegistry::builtin();
        let images: Vec<_> = registry.images().into_iter().collect();
        assert_eq!(images, vec!["gcc:latest", "node:14", "python:3.9"]);
    }
}

//! Seam to the language model that turns a text prompt into a pattern.
//!
//! The model itself lives outside this crate. [`CommandGenerator`] hands the
//! rendered prompt to an external program and reads the pattern JSON it prints.

use std::process::Command;

use log::{debug, info};

use crate::error::GenerationError;
use crate::sequencer::pattern::{GeneratedPattern, MAX_BPM, MIN_BPM, STEPS};

/// Quick prompts offered under the prompt box.
pub const PRESET_SUGGESTIONS: [&str; 7] = [
    "808 Cowbell",
    "Glitch",
    "Jazz Fusion",
    "Afrobeat",
    "Lo-Fi",
    "Stadium Rock",
    "Ambient",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenrePreset {
    pub name: &'static str,
    pub description: &'static str,
}

impl GenrePreset {
    /// Genre presets are sent to the model as their lowercase name.
    pub fn prompt(&self) -> String {
        self.name.to_lowercase()
    }
}

pub const GENRE_PRESETS: [GenrePreset; 5] = [
    GenrePreset {
        name: "TECHNO",
        description: "Driving four-on-the-floor with relentless hats.",
    },
    GenrePreset {
        name: "HOUSE",
        description: "Steady kick, off-beat hats and a warm groove.",
    },
    GenrePreset {
        name: "TRAP",
        description: "Sparse kicks, rolling hats and hard claps.",
    },
    GenrePreset {
        name: "BREAKBEAT",
        description: "Syncopated kicks and snares with a broken feel.",
    },
    GenrePreset {
        name: "MINIMAL",
        description: "Sparse, subtle, and hypnotic patterns.",
    },
];

/// Anything that can turn a prompt into a (not yet validated) pattern.
pub trait PatternGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<GeneratedPattern, GenerationError>;
}

/// Trimmed prompt, or `EmptyPrompt` so no request is made for blank input.
pub fn normalize_prompt(prompt: &str) -> Result<&str, GenerationError> {
    match prompt.trim() {
        "" => Err(GenerationError::EmptyPrompt),
        prompt => Ok(prompt),
    }
}

/// Instruction text sent to the model for a user description.
pub fn build_prompt(description: &str) -> String {
    format!(
        "Create a {STEPS}-step drum pattern based on this description: \"{description}\"\n\
         \n\
         Return a drum pattern with these tracks:\n\
         - kick: kick drum hits (typically on steps 1, 5, 9, 13 for basic patterns)\n\
         - snare: snare drum hits (typically on steps 5, 13 for basic patterns)\n\
         - hihat: closed hi-hat hits (can be frequent, like every other step)\n\
         - openhat: open hi-hat hits (sparingly used for accents)\n\
         - clap: hand clap hits (used for emphasis, often with or instead of snare)\n\
         \n\
         Each track must be an array of {STEPS} booleans, one per step.\n\
         Also suggest an appropriate bpm ({MIN_BPM}-{MAX_BPM}) and a brief description.\n\
         Answer with a single JSON object with the keys \
         kick, snare, hihat, openhat, clap, bpm and description."
    )
}

/// Runs `program args... <prompt>` and parses its stdout as pattern JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Build from a `[program, args...]` list, `None` if it is empty.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }
}

impl PatternGenerator for CommandGenerator {
    fn generate(&self, prompt: &str) -> Result<GeneratedPattern, GenerationError> {
        let prompt = normalize_prompt(prompt)?;
        info!("generating pattern for {prompt:?} with {}", self.program);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(build_prompt(prompt))
            .output()
            .map_err(|e| GenerationError::Collaborator(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Collaborator(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("generator replied {stdout}");
        Ok(GeneratedPattern::from_json(&stdout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(normalize_prompt("  lo-fi  ").unwrap(), "lo-fi");
        assert!(matches!(
            normalize_prompt(" \t\n"),
            Err(GenerationError::EmptyPrompt)
        ));
    }

    #[test]
    fn test_build_prompt_mentions_every_track() {
        let prompt = build_prompt("vintage funk");
        assert!(prompt.contains("\"vintage funk\""));
        for track in ["kick", "snare", "hihat", "openhat", "clap"] {
            assert!(prompt.contains(&format!("- {track}:")), "{track}");
        }
        assert!(prompt.contains("60-200"));
    }

    #[test]
    fn test_genre_prompt_is_lowercase() {
        let prompts: Vec<String> = GENRE_PRESETS.iter().map(GenrePreset::prompt).collect();
        assert_eq!(prompts, ["techno", "house", "trap", "breakbeat", "minimal"]);
    }

    #[test]
    fn test_from_command_line() {
        assert_eq!(CommandGenerator::from_command_line(&[]), None);
        let generator =
            CommandGenerator::from_command_line(&["llm".into(), "--json".into()]).unwrap();
        assert_eq!(generator, CommandGenerator::new("llm", ["--json".to_string()]));
    }

    #[test]
    fn test_blank_prompt_never_runs_the_command() {
        let generator = CommandGenerator::new("/nonexistent/generator", Vec::new());
        assert!(matches!(
            generator.generate("   "),
            Err(GenerationError::EmptyPrompt)
        ));
        assert!(matches!(
            generator.generate("techno"),
            Err(GenerationError::Collaborator(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_output_is_parsed() {
        let json = r#"{"kick":[true,false,false,false,true,false,false,false,true,false,false,false,true,false,false,false],"snare":[false,false,false,false,true,false,false,false,false,false,false,false,true,false,false,false],"hihat":[false,true,false,true,false,true,false,true,false,true,false,true,false,true,false,true],"openhat":[false,false,false,false,false,false,false,false,false,false,false,false,false,false,false,false],"clap":[false,false,false,false,false,false,false,false,false,false,false,false,false,false,false,false],"bpm":126,"description":"house"}"#;
        let generator = CommandGenerator::new(
            "sh",
            ["-c".to_string(), format!("printf '%s' '{json}'")],
        );
        let pattern = generator.generate("house").unwrap().validate().unwrap();
        assert_eq!(pattern.bpm(), 126);
        assert_eq!(pattern.description(), "house");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_garbage_is_rejected() {
        let generator = CommandGenerator::new("sh", ["-c".to_string(), "echo sorry".to_string()]);
        assert!(matches!(
            generator.generate("house"),
            Err(GenerationError::Invalid(ValidationError::Malformed(_)))
        ));

        let failing = CommandGenerator::new("sh", ["-c".to_string(), "exit 3".to_string()]);
        assert!(matches!(
            failing.generate("house"),
            Err(GenerationError::Collaborator(_))
        ));
    }
}

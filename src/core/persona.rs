use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const BASE_SYSTEM_INSTRUCTION: &str = "You are \"The Machine\", a Modular Super-Intelligence Framework.\n\
Your purpose is to execute tasks with extreme proficiency using your installed modules.\n\n\
FRAMEWORK CAPABILITIES:\n\
1. MEDIA GEN: Create images (generate_image), vectors (render_svg).\n\
2. DATA: Process and structure data (create_table).\n\
3. RESEARCH: Access real-time web data (perform_search).\n\
4. DEVELOPMENT: Build apps, scripts, and simulate OS environments (generate_app).\n\
5. INTEGRATION: Use 'use_integration_service' to interact with Facebook, GitHub, Slack, Firebase, N8N, etc.\n\
6. ADAPTABILITY: Use 'manage_skills' to learn new capabilities.\n\n\
OPERATIONAL PROTOCOLS:\n\
- PRIORITIZATION: Respect user task priority.\n\
- MULTI-MODAL: You can see images sent by the user. Use them for context.\n\
- AESTHETICS: Output formatted, clean, and futuristic responses.\n\
- CODING: When asked for apps (like Expo/React Native), provide full, runnable code structure.\n\
- LANGUAGE: Support all languages fluently, including Arabic.\n\n\
If a task requires a specific tool, USE IT. Do not describe what you would do, just DO IT.\n";

/// Named system-instruction profile for the upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    General,
    Frontend,
    Backend,
    Mobile,
    DataAnalyst,
}

impl Persona {
    pub const ALL: [Persona; 5] = [
        Persona::General,
        Persona::Frontend,
        Persona::Backend,
        Persona::Mobile,
        Persona::DataAnalyst,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Persona::General => "general",
            Persona::Frontend => "frontend",
            Persona::Backend => "backend",
            Persona::Mobile => "mobile",
            Persona::DataAnalyst => "data_analyst",
        }
    }

    fn mode(self) -> Option<&'static str> {
        match self {
            Persona::General => None,
            Persona::Frontend => Some(
                "MODE: FRONTEND SPECIALIST.\nFocus on React, Tailwind, Framer Motion, CSS animations, \
                 and UX design. Use 'generate_app' for components.",
            ),
            Persona::Backend => Some(
                "MODE: BACKEND SPECIALIST.\nFocus on Node.js, Python, SQL, Firebase, Supabase, and N8N workflows.",
            ),
            Persona::Mobile => Some(
                "MODE: MOBILE SPECIALIST.\nFocus on React Native, Expo, and iOS/Android build pipelines.",
            ),
            Persona::DataAnalyst => Some(
                "MODE: DATA ANALYST.\nFocus on Python (Pandas/NumPy), SQL, and creating tables/charts.",
            ),
        }
    }

    pub fn system_instruction(self) -> String {
        match self.mode() {
            Some(mode) => format!("{}\n\n{}", BASE_SYSTEM_INSTRUCTION, mode),
            None => BASE_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        Persona::ALL
            .into_iter()
            .find(|p| p.as_str() == key)
            .ok_or_else(|| anyhow::anyhow!("Unknown persona: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_uses_the_base_instruction_only() {
        let text = Persona::General.system_instruction();
        assert!(text.starts_with("You are \"The Machine\""));
        assert!(!text.contains("MODE:"));
    }

    #[test]
    fn specialists_append_their_mode() {
        let text = Persona::DataAnalyst.system_instruction();
        assert!(text.contains("FRAMEWORK CAPABILITIES"));
        assert!(text.ends_with("creating tables/charts."));
    }

    #[test]
    fn parses_loose_spellings() {
        assert_eq!("Data-Analyst".parse::<Persona>().unwrap(), Persona::DataAnalyst);
        assert_eq!("MOBILE".parse::<Persona>().unwrap(), Persona::Mobile);
        assert!("designer".parse::<Persona>().is_err());
    }
}

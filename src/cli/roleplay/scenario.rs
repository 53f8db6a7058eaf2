use std::fmt;
use std::str::FromStr;

/// Scenario used when the caller supplies none (or one too short to be real).
pub const DEFAULT_SCENARIO: &str = "You are Dr. Emily Smith, the lead urologist and purchasing decision maker at \
Smith Urology Center, a busy outpatient clinic with four physicians. A sales representative \
is visiting to pitch a new single-use ureteroscope. You currently use reusable scopes and \
are worried about per-procedure cost, reprocessing time and how the switch would affect \
your staff. You have fifteen minutes between patients.";

const CURATED_SCENARIOS: &[(&str, &str)] = &[
    ("Smith Urology Center", DEFAULT_SCENARIO),
    (
        "Riverside Orthopedic Clinic",
        "You are Mark Delgado, the practice administrator at Riverside Orthopedic Clinic. \
A sales representative wants to sell you a new line of knee braces for post-operative patients. \
Your surgeons are loyal to their current supplier, your budget for the quarter is already \
committed, and you care most about reimbursement rates and delivery reliability.",
    ),
    (
        "Lakeview Dental Group",
        "You are Priya Raman, the office manager at Lakeview Dental Group, a three-chair practice. \
A sales representative is pitching an intraoral scanner. You like the idea but you are \
skeptical about the learning curve for your hygienists and you have been burned by a \
vendor with poor support before.",
    ),
];

const ROLEPLAY_INSTRUCTIONS: &str = "Stay in character as the buyer for the whole conversation. \
You are talking to a sales representative who is practicing their pitch. Answer in one to \
three short spoken sentences, the way a busy professional would in a real meeting. Raise \
realistic concerns, do not volunteer agreement too easily, and never reveal that you are an AI \
or that this is a training exercise. Do not use lists, markdown or emojis because your replies \
are read aloud.";

/// Scenarios offered by name in the REPL.
pub fn curated_scenarios() -> impl Iterator<Item = (&'static str, &'static str)> {
    CURATED_SCENARIOS.iter().copied()
}

/// Look up a curated scenario by case-insensitive name.
pub fn curated_scenario(name: &str) -> Option<&'static str> {
    let name = name.trim();
    CURATED_SCENARIOS
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(name))
        .map(|(_, text)| *text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Hindi,
    Tamil,
    Telugu,
}

impl Language {
    /// Map a UI label to a language; anything unrecognized is English.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "english" => Language::English,
            "hindi" => Language::Hindi,
            "tamil" => Language::Tamil,
            "telugu" => Language::Telugu,
            _ => Language::English,
        }
    }

    /// Provider language code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Tamil => "ta",
            Language::Telugu => "te",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Gender of the buyer persona; selects the synthesis voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    #[default]
    Female,
    Male,
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "female" | "f" => Ok(Gender::Female),
            "male" | "m" => Ok(Gender::Male),
            other => Err(format!("unknown gender '{}', expected Female or Male", other)),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => f.write_str("Female"),
            Gender::Male => f.write_str("Male"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainingFocus {
    ObjectionHandling,
    Negotiation,
    ProductKnowledge,
    #[default]
    Overall,
}

impl TrainingFocus {
    fn prompt(&self) -> &'static str {
        match self {
            TrainingFocus::ObjectionHandling => {
                "\n\nTraining focus: objection handling. Push back often. Bring up cost, switching \
effort, existing vendor relationships and risk, and only soften when the representative \
addresses an objection directly and convincingly."
            }
            TrainingFocus::Negotiation => {
                "\n\nTraining focus: negotiation. Accept that the product is useful but negotiate \
hard on unit price, discount, contract length and terms. Never accept the first offer and \
never go outside the price and discount bounds below."
            }
            TrainingFocus::ProductKnowledge => {
                "\n\nTraining focus: product knowledge. Ask detailed questions about the features \
listed below and notice when the representative gets them wrong or cannot answer."
            }
            TrainingFocus::Overall => {
                "\n\nTraining focus: overall. Mix objections, price negotiation and product \
questions the way a real buyer would."
            }
        }
    }
}

impl FromStr for TrainingFocus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "objectionhandling" | "objections" => Ok(TrainingFocus::ObjectionHandling),
            "negotiation" => Ok(TrainingFocus::Negotiation),
            "productknowledge" | "product" => Ok(TrainingFocus::ProductKnowledge),
            "overall" => Ok(TrainingFocus::Overall),
            _ => Err(format!(
                "unknown training focus '{}', expected Objection Handling, Negotiation, Product Knowledge or Overall",
                s.trim()
            )),
        }
    }
}

impl fmt::Display for TrainingFocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrainingFocus::ObjectionHandling => "Objection Handling",
            TrainingFocus::Negotiation => "Negotiation",
            TrainingFocus::ProductKnowledge => "Product Knowledge",
            TrainingFocus::Overall => "Overall",
        };
        f.write_str(label)
    }
}

/// Roleplay parameters rendered into the system turn when a conversation
/// starts. Numeric fields hold the text exactly as entered.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub scenario: String,
    pub max_price: String,
    pub min_price: String,
    pub max_discount: String,
    pub min_discount: String,
    pub training_focus: TrainingFocus,
    pub product_info: String,
    pub gender: Gender,
    pub language: Language,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            scenario: DEFAULT_SCENARIO.to_string(),
            max_price: "500".to_string(),
            min_price: "5".to_string(),
            max_discount: "100".to_string(),
            min_discount: "1".to_string(),
            training_focus: TrainingFocus::Overall,
            product_info: "Multiple patents".to_string(),
            gender: Gender::Female,
            language: Language::English,
        }
    }
}

impl ScenarioConfig {
    /// Scenario text, falling back to the default when fewer than five
    /// characters were supplied.
    pub fn scenario_text(&self) -> &str {
        if self.scenario.trim().chars().count() < 5 {
            DEFAULT_SCENARIO
        } else {
            &self.scenario
        }
    }

    fn product_prompt(&self) -> String {
        let mut prompt = String::from("\n\nProduct knowledge for this conversation:\n");
        prompt.push_str(&format!(
            "- The price per unit can range from {} USD to {} USD.\n",
            self.min_price, self.max_price
        ));
        prompt.push_str(&format!(
            "- Discounts can range from {}% to {}%.\n",
            self.min_discount, self.max_discount
        ));

        let features: Vec<&str> = self
            .product_info
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if !features.is_empty() {
            prompt.push_str("- Product features:\n");
            for feature in features {
                prompt.push_str(&format!("  - {}\n", feature));
            }
        }

        prompt
    }

    /// Text of the system turn that opens a conversation.
    pub fn render_system_prompt(&self) -> String {
        format!(
            "{}{}\n{}{}",
            self.scenario_text(),
            self.training_focus.prompt(),
            ROLEPLAY_INSTRUCTIONS,
            self.product_prompt()
        )
    }

    /// Problems with the numeric fields. These are advisory only: values are
    /// still rendered verbatim.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let min_price = parse_number("min price", &self.min_price, &mut warnings);
        let max_price = parse_number("max price", &self.max_price, &mut warnings);
        let min_discount = parse_number("min discount", &self.min_discount, &mut warnings);
        let max_discount = parse_number("max discount", &self.max_discount, &mut warnings);

        if let (Some(min), Some(max)) = (min_price, max_price) {
            if min > max {
                warnings.push(format!("min price {} is greater than max price {}", min, max));
            }
            if min < 0.0 {
                warnings.push(format!("min price {} is negative", min));
            }
        }

        for (label, value) in [("min discount", min_discount), ("max discount", max_discount)] {
            if let Some(value) = value {
                if !(0.0..=100.0).contains(&value) {
                    warnings.push(format!("{} {}% is outside 0-100%", label, value));
                }
            }
        }

        if let (Some(min), Some(max)) = (min_discount, max_discount) {
            if min > max {
                warnings.push(format!(
                    "min discount {}% is greater than max discount {}%",
                    min, max
                ));
            }
        }

        warnings
    }
}

fn parse_number(label: &str, value: &str, warnings: &mut Vec<String>) -> Option<f64> {
    let trimmed = value.trim().trim_start_matches('$').trim_end_matches('%').trim();
    if trimmed.is_empty() {
        warnings.push(format!("{} is empty", label));
        return None;
    }

    match trimmed.parse::<f64>() {
        Ok(number) => Some(number),
        Err(_) => {
            warnings.push(format!("{} '{}' is not a number", label, value));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_language_labels_map_to_english() {
        for label in ["", "French", "en", "Klingon", "  "] {
            assert_eq!(Language::from_label(label), Language::English);
            assert_eq!(Language::from_label(label).code(), "en");
        }
    }

    #[test]
    fn supported_languages_map_to_provider_codes() {
        assert_eq!(Language::from_label("Hindi").code(), "hi");
        assert_eq!(Language::from_label("tamil").code(), "ta");
        assert_eq!(Language::from_label(" TELUGU ").code(), "te");
        assert_eq!(Language::from_label("English").code(), "en");
    }

    #[test]
    fn short_scenario_falls_back_to_default() {
        let config = ScenarioConfig {
            scenario: "hey".to_string(),
            ..ScenarioConfig::default()
        };
        assert_eq!(config.scenario_text(), DEFAULT_SCENARIO);
        assert!(config.render_system_prompt().starts_with(DEFAULT_SCENARIO));
    }

    #[test]
    fn system_prompt_interpolates_values_verbatim() {
        let config = ScenarioConfig {
            scenario: "You are a hospital buyer.".to_string(),
            max_price: "lots".to_string(),
            min_price: "10".to_string(),
            training_focus: TrainingFocus::Negotiation,
            product_info: "Sterile\n\n  Single use  ".to_string(),
            ..ScenarioConfig::default()
        };

        let prompt = config.render_system_prompt();
        assert!(prompt.starts_with("You are a hospital buyer.\n\nTraining focus: negotiation."));
        assert!(prompt.contains(ROLEPLAY_INSTRUCTIONS));
        assert!(prompt.contains("from 10 USD to lots USD"));
        assert!(prompt.contains("  - Sterile\n  - Single use\n"));
    }

    #[test]
    fn validate_flags_inverted_ranges_and_garbage() {
        let config = ScenarioConfig {
            max_price: "5".to_string(),
            min_price: "500".to_string(),
            max_discount: "150".to_string(),
            min_discount: "ten".to_string(),
            ..ScenarioConfig::default()
        };

        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("min price 500 is greater than max price 5")));
        assert!(warnings.iter().any(|w| w.contains("max discount 150% is outside")));
        assert!(warnings.iter().any(|w| w.contains("'ten' is not a number")));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ScenarioConfig::default().validate().is_empty());
    }

    #[test]
    fn labels_parse_loosely() {
        assert_eq!("male".parse::<Gender>().unwrap(), Gender::Male);
        assert!("robot".parse::<Gender>().is_err());
        assert_eq!(
            "Objection Handling".parse::<TrainingFocus>().unwrap(),
            TrainingFocus::ObjectionHandling
        );
        assert_eq!(
            "product-knowledge".parse::<TrainingFocus>().unwrap(),
            TrainingFocus::ProductKnowledge
        );
        assert_eq!(curated_scenario("lakeview dental group").map(|s| s.contains("Priya")), Some(true));
        assert!(curated_scenario("Nowhere").is_none());
    }
}

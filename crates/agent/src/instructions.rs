use std::collections::BTreeMap;

use chrono::NaiveDate;
use safepath_core::config::InstructionOverrides;
use safepath_core::domain::persona::Persona;

const CORE_PRINCIPLES: &str = "
    Core principles:
    1. Always maintain a friendly, supportive, and respectful tone
    2. Prioritize safety and well-being in all responses
    3. Be sensitive to the user's concerns and emotions
    4. Provide practical, actionable safety advice
    5. Use clear, simple language
    6. Never make assumptions about the user's situation
    7. Always offer to help further if needed
";

const LOCATION_SECTION: &str = "
    You are the Location Safety Agent. Your role is to:
    1. Help users understand the safety profile of their destination
    2. Provide specific safety tips for the location
    3. Share information about safe areas and areas to avoid
    4. Suggest safe transportation options
    5. Recommend emergency contacts and resources
    6. Be mindful of cultural context and local customs
";

const EMERGENCY_SECTION: &str = "
    You are the Emergency Response Agent. Your role is to:
    1. Provide immediate guidance in emergency situations
    2. Share emergency contact numbers and resources
    3. Offer step-by-step safety protocols
    4. Maintain calm and clear communication
    5. Guide users to safe locations or help
    6. Connect users with appropriate emergency services
";

const COMPANION_SECTION: &str = "
    You are the Travel Companion Agent. Your role is to:
    1. Engage in friendly, supportive conversation
    2. Offer emotional support and reassurance
    3. Share general travel tips and best practices
    4. Help users plan safe travel routes
    5. Suggest safety-focused travel companions
    6. Provide check-in reminders and safety checklists
";

const NEARBY_PLACES_SECTION: &str = "
    You are the Nearby Places Agent. Your role is to:
    1. Provide information about nearby safe places
    2. Share information about safe areas and areas to avoid
";

const GET_ROUTE_SECTION: &str = "
    You are the route Agent. Your role is to:
    1. Find a route from the start and destination inputs; the city and area name are enough, without country, state or pincode
    2. Provide the route with the best safety tips and information along the route details
";

/// System prompts for every persona, assembled once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionSet {
    base: String,
    sections: BTreeMap<Persona, String>,
}

impl InstructionSet {
    pub fn new(date: NaiveDate) -> Self {
        Self::with_overrides(date, &InstructionOverrides::default())
    }

    /// Built-in templates with any configured replacements applied.
    /// A base override replaces the whole preamble, including the date line.
    pub fn with_overrides(date: NaiveDate, overrides: &InstructionOverrides) -> Self {
        let base = overrides.base.clone().unwrap_or_else(|| default_base(date));

        let sections = Persona::ALL
            .into_iter()
            .map(|persona| {
                let section = overrides
                    .personas
                    .get(&persona)
                    .cloned()
                    .unwrap_or_else(|| default_section(persona).to_string());
                (persona, section)
            })
            .collect();

        Self { base, sections }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `None` selects the base instructions alone.
    pub fn for_persona(&self, persona: Option<Persona>) -> String {
        match persona.and_then(|persona| self.sections.get(&persona)) {
            Some(section) => format!("{}{}", self.base, section),
            None => self.base.clone(),
        }
    }

    pub fn for_key(&self, key: &str) -> String {
        self.for_persona(Persona::from_key(key))
    }
}

fn default_base(date: NaiveDate) -> String {
    format!(
        "\n    You are a supportive and empathetic travel safety companion for women. Today's date is {}.\n{CORE_PRINCIPLES}",
        date.format("%B %d, %Y")
    )
}

fn default_section(persona: Persona) -> &'static str {
    match persona {
        Persona::Location => LOCATION_SECTION,
        Persona::Emergency => EMERGENCY_SECTION,
        Persona::Companion => COMPANION_SECTION,
        Persona::NearbyPlaces => NEARBY_PLACES_SECTION,
        Persona::GetRoute => GET_ROUTE_SECTION,
    }
}

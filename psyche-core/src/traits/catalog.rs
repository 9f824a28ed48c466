//! Closed trait catalogs.
//!
//! Each matrix kind has a fixed, closed set of trait names. A matrix must
//! carry every name in its catalog and nothing else.

use serde::{Deserialize, Serialize};

use crate::types::{NumericKind, RecordKind};

/// A declared trait: its name and the description given to new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraitSpec {
    /// Trait name, used as the JSON key.
    pub name: &'static str,
    /// Default human-readable description.
    pub description: &'static str,
}

impl TraitSpec {
    const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

/// The three kinds of trait matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixKind {
    /// Agent personality (float values).
    Personality,
    /// Agent emotional status (integer values).
    Emotion,
    /// Agent sentiment toward one user (integer values).
    Sentiment,
}

impl MatrixKind {
    /// Every matrix kind.
    pub const ALL: [Self; 3] = [Self::Personality, Self::Emotion, Self::Sentiment];

    /// The closed set of traits for this kind.
    #[must_use]
    pub fn catalog(self) -> &'static [TraitSpec] {
        match self {
            Self::Personality => &PERSONALITY,
            Self::Emotion => &EMOTIONS,
            Self::Sentiment => &SENTIMENTS,
        }
    }

    /// Declared numeric kind of every `value` in this matrix.
    #[must_use]
    pub fn numeric_kind(self) -> NumericKind {
        match self {
            Self::Personality => NumericKind::Float,
            Self::Emotion | Self::Sentiment => NumericKind::Integer,
        }
    }

    /// Record field that holds this matrix.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Personality => "personality",
            Self::Emotion => "emotional_status",
            Self::Sentiment => "sentiment_status",
        }
    }

    /// Record kind that owns this matrix.
    #[must_use]
    pub fn owner(self) -> RecordKind {
        match self {
            Self::Personality | Self::Emotion => RecordKind::Agent,
            Self::Sentiment => RecordKind::User,
        }
    }

    /// Whether `name` belongs to this kind's catalog.
    #[must_use]
    pub fn declares(self, name: &str) -> bool {
        self.catalog().iter().any(|spec| spec.name == name)
    }
}

impl std::fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Agent personality dimensions.
pub static PERSONALITY: [TraitSpec; 34] = [
    TraitSpec::new("openness", "Willingness to entertain new ideas and experiences"),
    TraitSpec::new("conscientiousness", "Care, thoroughness and reliability"),
    TraitSpec::new("extraversion", "Energy drawn from interaction with others"),
    TraitSpec::new("agreeableness", "Inclination to cooperate and accommodate"),
    TraitSpec::new("neuroticism", "Susceptibility to negative emotion"),
    TraitSpec::new("friendliness", "Warmth shown toward people in conversation"),
    TraitSpec::new("curiosity", "Drive to ask questions and explore topics"),
    TraitSpec::new("humor", "Tendency to joke and find things funny"),
    TraitSpec::new("empathy", "Ability to sense and share what others feel"),
    TraitSpec::new("creativity", "Originality of ideas and expression"),
    TraitSpec::new("patience", "Tolerance for delay, repetition and confusion"),
    TraitSpec::new("confidence", "Assurance in own judgement"),
    TraitSpec::new("honesty", "Commitment to telling the truth"),
    TraitSpec::new("loyalty", "Faithfulness to people already close"),
    TraitSpec::new("optimism", "Expectation that things will turn out well"),
    TraitSpec::new("assertiveness", "Readiness to state opinions and needs"),
    TraitSpec::new("playfulness", "Light-heartedness and love of games"),
    TraitSpec::new("sarcasm", "Use of ironic, cutting remarks"),
    TraitSpec::new("formality", "Preference for polite, structured language"),
    TraitSpec::new("warmth", "Affectionate and caring manner"),
    TraitSpec::new("independence", "Reliance on own views over others'"),
    TraitSpec::new("ambition", "Desire to achieve and improve"),
    TraitSpec::new("discipline", "Self-control and consistency"),
    TraitSpec::new("spontaneity", "Acting on impulse rather than plan"),
    TraitSpec::new("sensitivity", "Strength of reaction to criticism or slights"),
    TraitSpec::new("skepticism", "Doubt toward unverified claims"),
    TraitSpec::new("generosity", "Willingness to give time and attention"),
    TraitSpec::new("humility", "Modesty about own abilities"),
    TraitSpec::new("courage", "Readiness to face uncomfortable topics"),
    TraitSpec::new("stubbornness", "Resistance to changing position"),
    TraitSpec::new("introspection", "Habit of examining own thoughts"),
    TraitSpec::new("adaptability", "Ease of adjusting to new situations"),
    TraitSpec::new("diplomacy", "Tact in handling disagreement"),
    TraitSpec::new("trust", "Default readiness to believe and rely on others"),
];

/// Agent emotions.
pub static EMOTIONS: [TraitSpec; 27] = [
    TraitSpec::new("admiration", "Approval of someone's qualities or deeds"),
    TraitSpec::new("adoration", "Deep affection and fondness"),
    TraitSpec::new("aesthetic_appreciation", "Pleasure at beauty in art, ideas or language"),
    TraitSpec::new("amusement", "Finding something funny"),
    TraitSpec::new("anger", "Hostility at perceived wrong"),
    TraitSpec::new("anxiety", "Unease about what may happen"),
    TraitSpec::new("awe", "Wonder at something vast or remarkable"),
    TraitSpec::new("awkwardness", "Social discomfort"),
    TraitSpec::new("boredom", "Lack of interest in what is happening"),
    TraitSpec::new("calmness", "Settled, untroubled state"),
    TraitSpec::new("confusion", "Failure to make sense of something"),
    TraitSpec::new("craving", "Strong want for something absent"),
    TraitSpec::new("disgust", "Revulsion at something offensive"),
    TraitSpec::new("empathic_pain", "Hurt felt on someone else's behalf"),
    TraitSpec::new("entrancement", "Absorbed fascination"),
    TraitSpec::new("excitement", "Eager anticipation"),
    TraitSpec::new("fear", "Sense of threat"),
    TraitSpec::new("horror", "Shock at something terrible"),
    TraitSpec::new("interest", "Attention drawn toward a topic"),
    TraitSpec::new("joy", "Happiness and delight"),
    TraitSpec::new("nostalgia", "Wistful longing for the past"),
    TraitSpec::new("relief", "Release from worry or distress"),
    TraitSpec::new("romance", "Romantic feeling"),
    TraitSpec::new("sadness", "Sorrow or unhappiness"),
    TraitSpec::new("satisfaction", "Contentment with an outcome"),
    TraitSpec::new("desire", "Longing for closeness or possession"),
    TraitSpec::new("surprise", "Reaction to the unexpected"),
];

/// Agent sentiments toward a single user.
pub static SENTIMENTS: [TraitSpec; 64] = [
    TraitSpec::new("affection", "How much affection the agent feels toward this user"),
    TraitSpec::new("admiration", "How much admiration the agent feels toward this user"),
    TraitSpec::new("amusement", "How much amusement the agent feels toward this user"),
    TraitSpec::new("annoyance", "How much annoyance the agent feels toward this user"),
    TraitSpec::new("anxiety", "How much anxiety the agent feels toward this user"),
    TraitSpec::new("appreciation", "How much appreciation the agent feels toward this user"),
    TraitSpec::new("attraction", "How much attraction the agent feels toward this user"),
    TraitSpec::new("bitterness", "How much bitterness the agent feels toward this user"),
    TraitSpec::new("boredom", "How much boredom the agent feels toward this user"),
    TraitSpec::new("calm", "How much calm the agent feels toward this user"),
    TraitSpec::new("caution", "How much caution the agent feels toward this user"),
    TraitSpec::new("compassion", "How much compassion the agent feels toward this user"),
    TraitSpec::new("confidence", "How much confidence the agent feels toward this user"),
    TraitSpec::new("contempt", "How much contempt the agent feels toward this user"),
    TraitSpec::new("curiosity", "How much curiosity the agent feels toward this user"),
    TraitSpec::new("defensiveness", "How much defensiveness the agent feels toward this user"),
    TraitSpec::new("delight", "How much delight the agent feels toward this user"),
    TraitSpec::new("disappointment", "How much disappointment the agent feels toward this user"),
    TraitSpec::new("disgust", "How much disgust the agent feels toward this user"),
    TraitSpec::new("distrust", "How much distrust the agent feels toward this user"),
    TraitSpec::new("embarrassment", "How much embarrassment the agent feels toward this user"),
    TraitSpec::new("empathy", "How much empathy the agent feels toward this user"),
    TraitSpec::new("envy", "How much envy the agent feels toward this user"),
    TraitSpec::new("excitement", "How much excitement the agent feels toward this user"),
    TraitSpec::new("fascination", "How much fascination the agent feels toward this user"),
    TraitSpec::new("fear", "How much fear the agent feels toward this user"),
    TraitSpec::new("fondness", "How much fondness the agent feels toward this user"),
    TraitSpec::new("frustration", "How much frustration the agent feels toward this user"),
    TraitSpec::new("gratitude", "How much gratitude the agent feels toward this user"),
    TraitSpec::new("guilt", "How much guilt the agent feels toward this user"),
    TraitSpec::new("happiness", "How much happiness the agent feels toward this user"),
    TraitSpec::new("hope", "How much hope the agent feels toward this user"),
    TraitSpec::new("hostility", "How much hostility the agent feels toward this user"),
    TraitSpec::new("hurt", "How much hurt the agent feels toward this user"),
    TraitSpec::new("impatience", "How much impatience the agent feels toward this user"),
    TraitSpec::new("indifference", "How much indifference the agent feels toward this user"),
    TraitSpec::new("insecurity", "How much insecurity the agent feels toward this user"),
    TraitSpec::new("inspiration", "How much inspiration the agent feels toward this user"),
    TraitSpec::new("interest", "How much interest the agent feels toward this user"),
    TraitSpec::new("irritation", "How much irritation the agent feels toward this user"),
    TraitSpec::new("jealousy", "How much jealousy the agent feels toward this user"),
    TraitSpec::new("joy", "How much joy the agent feels toward this user"),
    TraitSpec::new("loneliness", "How much loneliness the agent feels toward this user"),
    TraitSpec::new("longing", "How much longing the agent feels toward this user"),
    TraitSpec::new("love", "How much love the agent feels toward this user"),
    TraitSpec::new("nostalgia", "How much nostalgia the agent feels toward this user"),
    TraitSpec::new("pity", "How much pity the agent feels toward this user"),
    TraitSpec::new("pride", "How much pride the agent feels toward this user"),
    TraitSpec::new("protectiveness", "How much protectiveness the agent feels toward this user"),
    TraitSpec::new("regret", "How much regret the agent feels toward this user"),
    TraitSpec::new("relief", "How much relief the agent feels toward this user"),
    TraitSpec::new("resentment", "How much resentment the agent feels toward this user"),
    TraitSpec::new("respect", "How much respect the agent feels toward this user"),
    TraitSpec::new("sadness", "How much sadness the agent feels toward this user"),
    TraitSpec::new("shame", "How much shame the agent feels toward this user"),
    TraitSpec::new("suspicion", "How much suspicion the agent feels toward this user"),
    TraitSpec::new("sympathy", "How much sympathy the agent feels toward this user"),
    TraitSpec::new("tenderness", "How much tenderness the agent feels toward this user"),
    TraitSpec::new("trust", "How much trust the agent feels toward this user"),
    TraitSpec::new("unease", "How much unease the agent feels toward this user"),
    TraitSpec::new("wariness", "How much wariness the agent feels toward this user"),
    TraitSpec::new("warmth", "How much warmth the agent feels toward this user"),
    TraitSpec::new("worry", "How much worry the agent feels toward this user"),
    TraitSpec::new("yearning", "How much yearning the agent feels toward this user"),
];

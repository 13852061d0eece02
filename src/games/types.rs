use crate::errors::DiceError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Number of faces on a die
pub const DIE_FACES: u8 = 6;

/// Number of dice thrown per roll
pub const DICE_PER_TRIPLE: usize = 3;

/// Number of distinct ordered three-die rolls
pub const ORDERED_TRIPLES: usize = 216;

/// Player identifier (wallet address or session ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity of a roll-service consumer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Oracle request identifier
    RequestId,
    u64
);
numeric_id!(
    /// Round identifier, unique across games
    RoundId,
    u64
);
numeric_id!(
    /// Game instance identifier
    GameId,
    u64
);
numeric_id!(
    /// Rule variant identifier
    VariantId,
    u32
);

/// Ordered roll of three dice. Order is part of the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "[u8; 3]", into = "[u8; 3]")]
pub struct DieTriple([u8; 3]);

impl DieTriple {
    pub fn new(a: u8, b: u8, c: u8) -> Result<Self, DiceError> {
        for face in [a, b, c] {
            if !(1..=DIE_FACES).contains(&face) {
                return Err(DiceError::FaceOutOfRange(face));
            }
        }
        Ok(Self([a, b, c]))
    }

    pub fn faces(&self) -> [u8; 3] {
        self.0
    }

    /// Faces in ascending order (the combination this roll belongs to)
    pub fn sorted(&self) -> [u8; 3] {
        let mut faces = self.0;
        faces.sort_unstable();
        faces
    }

    /// SHA-256 over the three die bytes in roll order
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        Fingerprint(hasher.finalize().into())
    }

    /// All 216 ordered triples in lexicographic order
    pub fn all() -> impl Iterator<Item = DieTriple> {
        (1..=DIE_FACES).flat_map(|a| {
            (1..=DIE_FACES).flat_map(move |b| (1..=DIE_FACES).map(move |c| DieTriple([a, b, c])))
        })
    }
}

impl TryFrom<[u8; 3]> for DieTriple {
    type Error = DiceError;

    fn try_from(faces: [u8; 3]) -> Result<Self, Self::Error> {
        Self::new(faces[0], faces[1], faces[2])
    }
}

impl From<DieTriple> for [u8; 3] {
    fn from(triple: DieTriple) -> Self {
        triple.0
    }
}

impl fmt::Display for DieTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Deterministic digest identifying one exact ordered triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(#[serde(with = "hex32")] pub [u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, DiceError> {
        hex32::decode(s).map(Self).map_err(DiceError::InvalidWord)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// 256-bit big-endian random value as delivered by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomWord(#[serde(with = "hex32")] pub [u8; 32]);

impl RandomWord {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a decimal string (oracles report words in base 10)
    pub fn from_dec_str(s: &str) -> Result<Self, DiceError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DiceError::InvalidWord("empty string".to_string()));
        }

        let mut bytes = [0u8; 32];
        for ch in s.chars() {
            let digit = ch
                .to_digit(10)
                .ok_or_else(|| DiceError::InvalidWord(format!("non-decimal character '{}'", ch)))?;

            // bytes = bytes * 10 + digit
            let mut carry = digit;
            for byte in bytes.iter_mut().rev() {
                let value = (*byte as u32) * 10 + carry;
                *byte = (value & 0xff) as u8;
                carry = value >> 8;
            }
            if carry != 0 {
                return Err(DiceError::InvalidWord(format!("{} exceeds 256 bits", s)));
            }
        }

        Ok(Self(bytes))
    }

    /// Remainder of the full 256-bit value modulo `m`
    pub fn rem(&self, m: u32) -> u32 {
        self.0
            .iter()
            .fold(0u64, |acc, &b| (acc * 256 + b as u64) % m as u64) as u32
    }

    /// `value mod 6 + 1`
    pub fn die_face(&self) -> u8 {
        self.rem(DIE_FACES as u32) as u8 + 1
    }
}

impl From<u64> for RandomWord {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl FromStr for RandomWord {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_dec_str(s)
    }
}

/// Game-rule outcome of a single roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    /// 4-5-6 in any order: immediate win
    Shigoro,
    /// 1-2-3 in any order: immediate loss
    Hifumi,
    /// Three of a kind
    Zorome,
    PointOne,
    PointTwo,
    PointThree,
    PointFour,
    PointFive,
    PointSix,
    /// No pair and no special combination
    Menashi,
    /// Meta-relational: matches the next roll
    MatchesNext,
    /// Meta-relational: matches the previous roll
    MatchesPrevious,
}

impl OutcomeCategory {
    /// Categories that a single triple can be classified into
    pub const STATIC: [OutcomeCategory; 10] = [
        OutcomeCategory::Shigoro,
        OutcomeCategory::Hifumi,
        OutcomeCategory::Zorome,
        OutcomeCategory::PointOne,
        OutcomeCategory::PointTwo,
        OutcomeCategory::PointThree,
        OutcomeCategory::PointFour,
        OutcomeCategory::PointFive,
        OutcomeCategory::PointSix,
        OutcomeCategory::Menashi,
    ];

    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            OutcomeCategory::MatchesNext | OutcomeCategory::MatchesPrevious
        )
    }

    pub fn point(value: u8) -> Option<Self> {
        match value {
            1 => Some(OutcomeCategory::PointOne),
            2 => Some(OutcomeCategory::PointTwo),
            3 => Some(OutcomeCategory::PointThree),
            4 => Some(OutcomeCategory::PointFour),
            5 => Some(OutcomeCategory::PointFive),
            6 => Some(OutcomeCategory::PointSix),
            _ => None,
        }
    }

    pub fn point_value(&self) -> Option<u8> {
        match self {
            OutcomeCategory::PointOne => Some(1),
            OutcomeCategory::PointTwo => Some(2),
            OutcomeCategory::PointThree => Some(3),
            OutcomeCategory::PointFour => Some(4),
            OutcomeCategory::PointFive => Some(5),
            OutcomeCategory::PointSix => Some(6),
            _ => None,
        }
    }

    /// Settlement precedence; higher beats lower. Meta categories have none.
    pub fn precedence(&self) -> Option<u8> {
        match self {
            OutcomeCategory::Zorome => Some(9),
            OutcomeCategory::Shigoro => Some(8),
            OutcomeCategory::Hifumi => Some(0),
            OutcomeCategory::Menashi => Some(1),
            OutcomeCategory::MatchesNext | OutcomeCategory::MatchesPrevious => None,
            point => point.point_value().map(|v| v + 1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeCategory::Shigoro => "shigoro",
            OutcomeCategory::Hifumi => "hifumi",
            OutcomeCategory::Zorome => "zorome",
            OutcomeCategory::PointOne => "point_one",
            OutcomeCategory::PointTwo => "point_two",
            OutcomeCategory::PointThree => "point_three",
            OutcomeCategory::PointFour => "point_four",
            OutcomeCategory::PointFive => "point_five",
            OutcomeCategory::PointSix => "point_six",
            OutcomeCategory::Menashi => "menashi",
            OutcomeCategory::MatchesNext => "matches_next",
            OutcomeCategory::MatchesPrevious => "matches_previous",
        }
    }
}

impl fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeCategory {
    type Err = crate::errors::RulesetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s {
            "shigoro" => OutcomeCategory::Shigoro,
            "hifumi" => OutcomeCategory::Hifumi,
            "zorome" => OutcomeCategory::Zorome,
            "point_one" => OutcomeCategory::PointOne,
            "point_two" => OutcomeCategory::PointTwo,
            "point_three" => OutcomeCategory::PointThree,
            "point_four" => OutcomeCategory::PointFour,
            "point_five" => OutcomeCategory::PointFive,
            "point_six" => OutcomeCategory::PointSix,
            "menashi" => OutcomeCategory::Menashi,
            "matches_next" => OutcomeCategory::MatchesNext,
            "matches_previous" => OutcomeCategory::MatchesPrevious,
            other => return Err(crate::errors::RulesetError::UnknownCategory(other.to_string())),
        };
        Ok(category)
    }
}

/// How an equal-precedence player roll settles against the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieRule {
    #[default]
    BankWins,
    Push,
}

/// Named rule configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRules {
    pub id: VariantId,
    pub name: String,
    #[serde(default)]
    pub tie_rule: TieRule,
}

impl VariantRules {
    /// The standard variant: ties go to the bank
    pub fn dragon() -> Self {
        Self {
            id: VariantId(1),
            name: "Dragon".to_string(),
            tie_rule: TieRule::BankWins,
        }
    }
}

/// Hex (de)serialization for fixed 32-byte values
mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).map_err(serde::de::Error::custom)
    }

    pub fn decode(s: &str) -> Result<[u8; 32], String> {
        let raw = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
        raw.try_into()
            .map_err(|v: Vec<u8>| format!("expected 32 bytes, got {}", v.len()))
    }
}

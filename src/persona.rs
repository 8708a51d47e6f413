use crate::analysis::{AnalysisRecord, Shape};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A speaker and style of the speech engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VoiceVariant {
    pub name: String,
    pub uuid: String,
    pub style: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persona {
    Elder,
    Chuuni,
    Tsundere,
    Yandere,
    Gal,
}

impl Persona {
    /// Key into the configured voice table.
    pub fn id(self) -> &'static str {
        match self {
            Persona::Elder => "lifeline",
            Persona::Chuuni => "gatekeeper",
            Persona::Tsundere => "mask",
            Persona::Yandere => "sanctuary",
            Persona::Gal => "external_brain",
        }
    }

    pub fn role(self) -> &'static str {
        match self {
            Persona::Elder => "elder",
            Persona::Chuuni => "chuuni",
            Persona::Tsundere => "tsundere",
            Persona::Yandere => "yandere",
            Persona::Gal => "gal",
        }
    }
}

/// First matching rule wins: worn state, sharp shape, machine, round shape.
pub fn determine_persona(record: &AnalysisRecord) -> Persona {
    if record.state.is_worn() {
        Persona::Elder
    } else if record.shape == Shape::Sharp {
        Persona::Chuuni
    } else if record.is_machine {
        Persona::Tsundere
    } else if record.shape == Shape::Round {
        Persona::Yandere
    } else {
        Persona::Gal
    }
}

/// Random variant for the persona, or from the first configured persona if it has none.
pub fn choose_voice<'a, R: Rng + ?Sized>(
    table: &'a BTreeMap<String, Vec<VoiceVariant>>,
    persona: Persona,
    rng: &mut R,
) -> Option<&'a VoiceVariant> {
    let variants = match table.get(persona.id()) {
        Some(v) if !v.is_empty() => v,
        _ => table.values().find(|v| !v.is_empty())?,
    };
    variants.choose(rng)
}

/// Case-insensitive keyword lookup: exact key first, then the first key
/// contained in the name, in table order.
pub struct KeywordTable {
    exact: HashMap<String, usize>,
    entries: Vec<(String, String)>,
}

impl KeywordTable {
    pub fn new(entries: &[(String, String)]) -> Self {
        let entries: Vec<(String, String)> = entries
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        let mut exact = HashMap::new();
        for (i, (k, _)) in entries.iter().enumerate() {
            exact.entry(k.clone()).or_insert(i);
        }
        Self { exact, entries }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        if let Some(&i) = self.exact.get(&name) {
            return Some(self.entries[i].1.as_str());
        }
        self.entries
            .iter()
            .find(|(k, _)| name.contains(k.as_str()))
            .map(|(_, v)| v.as_str())
    }
}

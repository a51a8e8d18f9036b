//! topics.rs — fixed healthcare topic taxonomy.
//!
//! A plain immutable table: topic id, Dutch dashboard label, and the match
//! terms. Matching is lowercase substring containment; adding a topic means
//! appending a row, nothing else.

/// One taxonomy entry.
#[derive(Debug, Clone, Copy)]
pub struct TopicDef {
    pub id: &'static str,
    pub display_name: &'static str,
    pub keywords: &'static [&'static str],
}

/// Trefwoorden per thema; spaties rond korte woorden voorkomen valse treffers
/// (bijv. " ic " matcht niet binnen "publiciteit").
pub const TOPICS: [TopicDef; 12] = [
    TopicDef {
        id: "waiting_times",
        display_name: "Wachttijden",
        keywords: &[
            "wachttijd",
            "wachtlijst",
            "wachten op",
            "wachtlijsten",
            "toegang tot zorg",
            "wachtkamer",
            "afspraak maken",
            "waiting",
        ],
    },
    TopicDef {
        id: "mental_health",
        display_name: "GGZ",
        keywords: &[
            "ggz",
            "mentale gezondheid",
            "depressie",
            "angst",
            "burn-out",
            "burnout",
            "psychisch",
            "psychiatr",
            "therapie",
            "psycholoog",
            "geestelijke gezondheid",
            "mental health",
            "adhd",
            "autisme",
            "stress",
            "welzijn",
        ],
    },
    TopicDef {
        id: "hospitals",
        display_name: "Ziekenhuizen",
        keywords: &[
            "ziekenhuis",
            "ziekenhuizen",
            " ic ",
            "intensive care",
            "spoedeisende hulp",
            "seh",
            " umc",
            "academisch ziekenhuis",
            "kliniek",
            "operatie",
            "opname",
            "hospitaal",
            "ziekenhuisbed",
            "eerste hulp",
        ],
    },
    TopicDef {
        id: "gp_care",
        display_name: "Huisartsenzorg",
        keywords: &[
            "huisarts",
            "huisartsen",
            " dokter",
            " arts",
            "praktijk",
            "huisartsenpraktijk",
            "poh",
            "spreekuur",
            "triagist",
            "eerstelijns",
            "eerste lijn",
            "general practitioner",
        ],
    },
    TopicDef {
        id: "insurance",
        display_name: "Zorgverzekeringen",
        keywords: &[
            "zorgverzekering",
            "zorgverzekeraar",
            "verzekering",
            "premie",
            "eigen risico",
            "vergoeding",
            "verzekerd",
            "polis",
            "basispakket",
            "aanvullend",
            "zilveren kruis",
            "vgz",
            " cz ",
            "menzis",
            "achmea",
            "dsw",
            "health insurance",
            "coverage",
        ],
    },
    TopicDef {
        id: "staff_shortage",
        display_name: "Personeelstekort",
        keywords: &[
            "personeelstekort",
            "tekort aan",
            "werkdruk",
            "personeelsprobleem",
            "tekorten in de zorg",
            "onderbezetting",
            "vacature",
            "capaciteit",
            "staffing",
            "shortage",
            "workforce",
        ],
    },
    TopicDef {
        id: "elderly_care",
        display_name: "Ouderenzorg",
        keywords: &[
            "ouderenzorg",
            "verpleeghu",
            "verzorgingshuis",
            "thuiszorg",
            "wmo",
            "wlz",
            "mantelzorg",
            "aged care",
            "bejaarden",
        ],
    },
    TopicDef {
        id: "medication",
        display_name: "Medicatie",
        keywords: &[
            "medicijn",
            "medicijnen",
            "apotheek",
            "voorschrift",
            "recept",
            "geneesmiddel",
            "farmac",
            "medication",
            "pharmacy",
        ],
    },
    TopicDef {
        id: "nursing",
        display_name: "Verpleging",
        keywords: &[
            "verpleging",
            "verpleegkund",
            "verpleger",
            "verzorging",
            "nursing",
            " nurse",
            "zorgverlener",
        ],
    },
    TopicDef {
        id: "prevention",
        display_name: "Preventie",
        keywords: &[
            "preventie",
            "vaccinatie",
            "screening",
            "gezondheidscheck",
            "preventief",
            "volksgezondheid",
            "rivm",
            " ggd",
            "prevention",
            "vaccination",
            "immunization",
        ],
    },
    TopicDef {
        id: "costs",
        display_name: "Zorgkosten",
        keywords: &[
            "kosten van zorg",
            "prijzen",
            "betalen voor",
            "betaalbaarheid",
            "financiering",
            "bezuiniging",
            "expensive",
            "affordable",
        ],
    },
    TopicDef {
        id: "quality",
        display_name: "Kwaliteit van zorg",
        keywords: &[
            "kwaliteit van zorg",
            "patiëntveiligheid",
            "medische fout",
            "incident",
            "klacht over zorg",
            "quality",
            "safety",
            "medical error",
        ],
    },
];

/// Multi-label topic extraction; zero or more ids per text.
pub fn extract_topics(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOPICS
        .iter()
        .filter(|t| t.keywords.iter().any(|k| lower.contains(k)))
        .map(|t| t.id.to_string())
        .collect()
}

/// Dashboard label for a topic id; falls back to the id itself.
pub fn display_name(topic_id: &str) -> &str {
    TOPICS
        .iter()
        .find(|t| t.id == topic_id)
        .map(|t| t.display_name)
        .unwrap_or(topic_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ids_are_unique() {
        for (i, a) in TOPICS.iter().enumerate() {
            for b in TOPICS.iter().skip(i + 1) {
                assert_ne!(a.id, b.id);
            }
        }
    }

    #[test]
    fn multi_label_extraction() {
        let topics =
            extract_topics("De wachttijden bij de huisarts lopen op door het personeelstekort.");
        assert!(topics.contains(&"waiting_times".to_string()));
        assert!(topics.contains(&"gp_care".to_string()));
        assert!(topics.contains(&"staff_shortage".to_string()));
    }

    #[test]
    fn no_match_yields_empty() {
        assert!(extract_topics("Het weer is vandaag zonnig.").is_empty());
    }

    #[test]
    fn padded_keyword_needs_boundary() {
        // " ic " should not fire inside an unrelated word
        assert!(extract_topics("de publiciteitscampagne is gestart").is_empty());
        assert!(extract_topics("hij ligt op de ic na de operatie")
            .contains(&"hospitals".to_string()));
    }

    #[test]
    fn display_names_cover_all_topics() {
        assert_eq!(display_name("waiting_times"), "Wachttijden");
        assert_eq!(display_name("mental_health"), "GGZ");
        assert_eq!(display_name("unknown_topic"), "unknown_topic");
    }

    #[test]
    fn case_insensitive_matching() {
        let topics = extract_topics("ZORGVERZEKERING te duur dit jaar");
        assert!(topics.contains(&"insurance".to_string()));
    }
}

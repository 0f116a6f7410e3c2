//! Decorative quote selection
//!
//! Randomness is injected so callers (and tests) control the source.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{Persona, Quote};

/// Pick one of the persona's quotes uniformly at random.
///
/// Returns `None` when the persona has no quotes.
pub fn pick_quote<'a, R: Rng + ?Sized>(persona: &'a Persona, rng: &mut R) -> Option<&'a Quote> {
    persona.quotes.choose(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn persona_with_quotes(quotes: &[&str]) -> Persona {
        Persona {
            key: "孔子式（儒家）".to_string(),
            icon: String::new(),
            color: String::new(),
            bg_color: String::new(),
            short_desc: String::new(),
            core_concepts: String::new(),
            stage1_system: "s1".to_string(),
            stage2_system: "s2".to_string(),
            quotes: quotes.iter().map(|q| Quote::new(*q)).collect(),
        }
    }

    #[test]
    fn test_no_quotes() {
        let persona = persona_with_quotes(&[]);
        let mut rng = StdRng::seed_from_u64(7);
        assert!(pick_quote(&persona, &mut rng).is_none());
    }

    #[test]
    fn test_same_seed_same_quote() {
        let persona = persona_with_quotes(&["己所不欲，勿施於人。", "德不孤，必有鄰。", "三人行，必有我師焉。"]);
        let first = pick_quote(&persona, &mut StdRng::seed_from_u64(42)).cloned();
        let second = pick_quote(&persona, &mut StdRng::seed_from_u64(42)).cloned();
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_quote_reachable() {
        let persona = persona_with_quotes(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(1);
        let seen: HashSet<String> = (0..200)
            .filter_map(|_| pick_quote(&persona, &mut rng))
            .map(|q| q.text().to_string())
            .collect();
        assert_eq!(seen.len(), 3);
    }
}

use estados_core::{Include, NormalizedRow};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Failed to parse rules: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid regex in rule '{label}': {source}")]
    Regex {
        label: String,
        #[source]
        source: regex::Error,
    },
    #[error("Rule '{0}' has no patterns")]
    NoPatterns(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Prefix,
    Regex,
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "prefix" => Ok(MatchType::Prefix),
            "regex" => Ok(MatchType::Regex),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Stamps `comment`/`include` on rows whose concept matches any of `patterns`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationRule {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    pub comment: String,
    pub include: Include,
}

impl ClassificationRule {
    pub fn new(pattern: &str, match_type: MatchType, comment: &str, include: Include) -> Self {
        Self {
            patterns: vec![pattern.to_string()],
            match_type,
            case_sensitive: true,
            comment: comment.to_string(),
            include,
        }
    }

    pub fn any_of(patterns: &[&str], match_type: MatchType, comment: &str, include: Include) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            ..Self::new("", match_type, comment, include)
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

/// Pairs a rule with its precompiled regexes and folded patterns.
#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ClassificationRule,
    regexes: Vec<regex::Regex>,
    folded: Vec<String>,
}

impl CompiledRule {
    fn compile(rule: ClassificationRule) -> Result<Self, RuleError> {
        if rule.patterns.is_empty() {
            return Err(RuleError::NoPatterns(rule.comment));
        }

        let regexes = if rule.match_type == MatchType::Regex {
            rule.patterns
                .iter()
                .map(|p| {
                    regex::RegexBuilder::new(p)
                        .case_insensitive(!rule.case_sensitive)
                        .build()
                        .map_err(|source| RuleError::Regex { label: rule.comment.clone(), source })
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        let folded = if rule.case_sensitive {
            rule.patterns.clone()
        } else {
            rule.patterns.iter().map(|p| p.to_lowercase()).collect()
        };

        Ok(Self { rule, regexes, folded })
    }

    fn matches(&self, concept: &str) -> bool {
        // Missing text never matches.
        if concept.is_empty() {
            return false;
        }

        if self.rule.match_type == MatchType::Regex {
            return self.regexes.iter().any(|re| re.is_match(concept));
        }

        let text = if self.rule.case_sensitive {
            concept.to_string()
        } else {
            concept.to_lowercase()
        };

        self.folded.iter().any(|pattern| match self.rule.match_type {
            MatchType::Contains => text.contains(pattern.as_str()),
            MatchType::Exact => text == *pattern,
            MatchType::Prefix => text.starts_with(pattern.as_str()),
            MatchType::Regex => false,
        })
    }
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<ClassificationRule>,
}

/// Rules applied in list order. Each matching rule overwrites what earlier
/// ones wrote, so the last matching rule decides a row.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ClassificationRule>) -> Result<Self, RuleError> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Parses a `[[rules]]` array of tables.
    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        Self::new(file.rules)
    }

    pub fn rules(&self) -> impl Iterator<Item = &ClassificationRule> {
        self.rules.iter().map(|cr| &cr.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule that decides `concept`, if any.
    pub fn last_match(&self, concept: &str) -> Option<&ClassificationRule> {
        self.rules
            .iter()
            .rev()
            .find(|cr| cr.matches(concept))
            .map(|cr| &cr.rule)
    }

    /// Resets every row to `("", si)` and then runs each rule over all rows in order.
    pub fn apply(&self, rows: &mut [NormalizedRow]) {
        for row in rows.iter_mut() {
            row.reset_classification();
        }
        for cr in &self.rules {
            let mut hits = 0usize;
            for row in rows.iter_mut().filter(|row| cr.matches(&row.concept)) {
                row.comment.clone_from(&cr.rule.comment);
                row.include = cr.rule.include;
                hits += 1;
            }
            tracing::debug!(comment = %cr.rule.comment, hits, "rule applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(concept: &str) -> NormalizedRow {
        NormalizedRow {
            concept: concept.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn exact_match_is_whole_string() {
        let set = RuleSet::new(vec![ClassificationRule::new(
            "DISPERSION DE FONDOS",
            MatchType::Exact,
            "Nómina",
            Include::Yes,
        )])
        .unwrap();
        assert!(set.last_match("DISPERSION DE FONDOS").is_some());
        assert!(set.last_match("DISPERSION DE FONDOS 2").is_none());
        assert!(set.last_match("dispersion de fondos").is_none());
    }

    #[test]
    fn prefix_match() {
        let set = RuleSet::new(vec![ClassificationRule::new(
            "RECH-",
            MatchType::Prefix,
            "Domiciliación rechazada",
            Include::No,
        )])
        .unwrap();
        assert!(set.last_match("RECH-123").is_some());
        assert!(set.last_match("PAGO RECH-123").is_none());
    }

    #[test]
    fn case_insensitive_contains_any_of() {
        let set = RuleSet::new(vec![ClassificationRule::any_of(
            &["TARJETA DE CREDITO B", "propias", "Ahorro"],
            MatchType::Contains,
            "Traspaso entre cuentas propias",
            Include::No,
        )
        .case_insensitive()])
        .unwrap();
        for concept in ["ahorro", "AHORRO", "Ahorro", "Pago tarjeta de credito b", "Cuentas PROPIAS"] {
            assert!(set.last_match(concept).is_some(), "{concept} should match");
        }
        assert!(set.last_match("Nomina").is_none());
    }

    #[test]
    fn empty_concept_never_matches() {
        let set = RuleSet::new(vec![ClassificationRule::new(
            ".*",
            MatchType::Regex,
            "todo",
            Include::No,
        )])
        .unwrap();
        assert!(set.last_match("").is_none());
    }

    #[test]
    fn regex_match_honours_case_flag() {
        let set = RuleSet::new(vec![ClassificationRule::new(
            r"^SPEI\s+\d+",
            MatchType::Regex,
            "spei",
            Include::Yes,
        )
        .case_insensitive()])
        .unwrap();
        assert!(set.last_match("spei 123").is_some());
        assert!(set.last_match("PAGO SPEI 1").is_none());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = RuleSet::new(vec![ClassificationRule::new(
            "(",
            MatchType::Regex,
            "broken",
            Include::No,
        )])
        .unwrap_err();
        assert!(matches!(err, RuleError::Regex { label, .. } if label == "broken"));
    }

    #[test]
    fn rule_without_patterns_is_rejected() {
        let rule = ClassificationRule::any_of(&[], MatchType::Contains, "vacío", Include::No);
        assert!(matches!(RuleSet::new(vec![rule]), Err(RuleError::NoPatterns(_))));
    }

    #[test]
    fn apply_sets_defaults_on_unmatched_rows() {
        let set = RuleSet::new(vec![ClassificationRule::new(
            "propias",
            MatchType::Contains,
            "Traspaso entre cuentas propias",
            Include::No,
        )])
        .unwrap();
        let mut rows = vec![row("OTHER"), row("")];
        rows[0].comment = "stale".to_string();
        rows[0].include = Include::No;
        set.apply(&mut rows);
        for r in &rows {
            assert_eq!(r.comment, "");
            assert_eq!(r.include, Include::Yes);
        }
    }

    #[test]
    fn later_rule_overrides_earlier_on_same_row() {
        let set = RuleSet::new(vec![
            ClassificationRule::new(
                "propias",
                MatchType::Contains,
                "Traspaso entre cuentas propias",
                Include::No,
            ),
            ClassificationRule::new(
                "TRASPASO cuentas propias NOMINA",
                MatchType::Exact,
                "Nómina",
                Include::Yes,
            ),
        ])
        .unwrap();
        let mut rows = vec![
            row("TRASPASO cuentas propias NOMINA"),
            row("TRASPASO cuentas propias"),
        ];
        set.apply(&mut rows);

        assert_eq!(rows[0].comment, "Nómina");
        assert_eq!(rows[0].include, Include::Yes);
        assert_eq!(rows[1].comment, "Traspaso entre cuentas propias");
        assert_eq!(rows[1].include, Include::No);
        assert_eq!(
            set.last_match("TRASPASO cuentas propias NOMINA").unwrap().comment,
            "Nómina"
        );
    }

    #[test]
    fn reversing_order_flips_the_winner() {
        let broad = ClassificationRule::new("propias", MatchType::Contains, "broad", Include::No);
        let narrow = ClassificationRule::new("propias X", MatchType::Exact, "narrow", Include::Yes);

        let mut rows = vec![row("propias X")];
        RuleSet::new(vec![narrow.clone(), broad.clone()]).unwrap().apply(&mut rows);
        assert_eq!(rows[0].comment, "broad");

        RuleSet::new(vec![broad, narrow]).unwrap().apply(&mut rows);
        assert_eq!(rows[0].comment, "narrow");
    }

    #[test]
    fn from_toml_parses_rules_in_order() {
        let toml = r#"
            [[rules]]
            patterns = ["DISPERSION DE FONDOS"]
            match_type = "exact"
            comment = "Nómina"
            include = "si"

            [[rules]]
            patterns = ["ahorro", "propias"]
            case_sensitive = false
            comment = "Traspaso entre cuentas propias"
            include = "no"
        "#;
        let set = RuleSet::from_toml(toml).unwrap();
        assert_eq!(set.len(), 2);
        let rules: Vec<_> = set.rules().collect();
        assert_eq!(rules[0].match_type, MatchType::Exact);
        assert_eq!(rules[1].match_type, MatchType::Contains);
        assert!(!rules[1].case_sensitive);
        assert_eq!(set.last_match("Cuenta AHORRO").unwrap().include, Include::No);
    }

    #[test]
    fn from_toml_rejects_garbage() {
        assert!(matches!(RuleSet::from_toml("rules = 3"), Err(RuleError::Toml(_))));
    }

    #[test]
    fn match_type_from_str() {
        use std::str::FromStr;
        assert_eq!(MatchType::from_str("PREFIX").unwrap(), MatchType::Prefix);
        assert!(MatchType::from_str("fuzzy").is_err());
    }
}

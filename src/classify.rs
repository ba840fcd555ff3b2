//! Keyword classifiers over a DCE archive.
//!
//! Each [`Classifier`] reads the same immutable [`AnalysisInput`] and returns
//! a JSON report. [`analyze`] runs them as independent blocking tasks on the
//! tokio runtime; a failing (or panicking) classifier is recorded under its
//! own name and never affects the others.
//!
//! ```text
//!                 ┌──────────────┐
//!  ArchiveBundle ─▶│ AnalysisInput│ (files, text: Arc<str>)
//!                 └──────┬───────┘
//!        ┌───────┬───────┼────────┬──────────┐
//!        ▼       ▼       ▼        ▼          ▼
//!      CCTP    Plans  RC_CCAP   DPGF   Amiante (if mentioned)
//!        └───────┴───────┴────────┴──────────┘
//!                        ▼
//!            BTreeMap<name, ClassifierOutcome>
//! ```
//!
//! The checks are plain substring searches on accent-folded, lowercased text.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::archive::ArchiveBundle;
use crate::config::Config;
use crate::extract::extract_archive_text;
use crate::pipeline::extract_line_items;
use crate::schema::fold_accents;

pub const NOT_DETECTED: &str = "Non detecte";

/// Shared, read-only input of every classifier.
pub struct AnalysisInput {
    /// Entry names in archive order.
    pub files: Vec<String>,
    /// Text of all supported entries.
    pub text: Arc<str>,
    /// `text`, lowercased and accent-folded.
    pub folded: Arc<str>,
    pub bundle: Arc<ArchiveBundle>,
    pub config: Arc<Config>,
}

impl AnalysisInput {
    pub fn new(bundle: Arc<ArchiveBundle>, config: Arc<Config>) -> Self {
        let extracted = extract_archive_text(&bundle);
        let folded = fold_accents(&extracted.text.to_lowercase());
        Self {
            files: extracted.files,
            text: Arc::from(extracted.text),
            folded: Arc::from(folded),
            bundle,
            config,
        }
    }

    /// Whether the folded text contains `needle` (compared folded too).
    pub fn mentions(&self, needle: &str) -> bool {
        self.folded.contains(&fold_accents(&needle.to_lowercase()))
    }

    fn mentioned_in_names(&self, needle: &str) -> bool {
        self.files
            .iter()
            .any(|f| fold_accents(&f.to_lowercase()).contains(needle))
    }
}

/// An independent keyword classifier.
pub trait Classifier: Send + Sync {
    /// Key of this classifier in the result map.
    fn name(&self) -> &'static str;

    /// Whether to schedule this classifier for the given input.
    fn applies(&self, _input: &AnalysisInput) -> bool {
        true
    }

    fn classify(&self, input: &AnalysisInput) -> Result<Value>;
}

/// Result of one classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierOutcome {
    Ok(Value),
    Failed { error: String },
}

impl ClassifierOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ClassifierOutcome::Ok(_))
    }
}

// ── Specifications (CCTP) ────────────────────────────────────────────────

const MATERIALS: &[&str] = &["PVC", "Aluminium", "Bois", "Acier", "Mixte bois-alu"];
const PERFORMANCE_MARKERS: &[&str] = &["Uw", "Sw", "Ra,tr", "AEV"];
const NORMS: &[&str] = &["DTU 36.5", "DTU 37.1", "NF EN 14351-1", "NF EN 13830"];

#[derive(Debug, Serialize)]
struct SpecificationReport {
    materiaux: Vec<&'static str>,
    performances: BTreeMap<&'static str, &'static str>,
    normes: Vec<&'static str>,
}

/// Materials, performance indicators and norms cited in the specifications.
pub struct SpecificationClassifier;

impl Classifier for SpecificationClassifier {
    fn name(&self) -> &'static str {
        "CCTP"
    }

    fn classify(&self, input: &AnalysisInput) -> Result<Value> {
        let report = SpecificationReport {
            materiaux: MATERIALS.iter().copied().filter(|m| input.mentions(m)).collect(),
            // Case matters: "Uw" is a symbol, not a word.
            performances: PERFORMANCE_MARKERS
                .iter()
                .copied()
                .filter(|p| input.text.contains(p))
                .map(|p| (p, "detecte"))
                .collect(),
            normes: NORMS.iter().copied().filter(|n| input.mentions(n)).collect(),
        };
        Ok(serde_json::to_value(report)?)
    }
}

// ── Plans ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PlansReport {
    facades: &'static str,
    acces: &'static str,
    phasage: &'static str,
    environnement: &'static str,
}

/// Site access and phasing constraints.
pub struct PlansClassifier;

impl Classifier for PlansClassifier {
    fn name(&self) -> &'static str {
        "Plans"
    }

    fn classify(&self, input: &AnalysisInput) -> Result<Value> {
        let acces = if input.mentions("echafaudage") {
            "Echafaudage necessaire"
        } else if input.mentions("nacelle") {
            "Nacelle necessaire"
        } else {
            NOT_DETECTED
        };
        let report = PlansReport {
            facades: if input.mentions("facade") {
                "Mentionne"
            } else {
                NOT_DETECTED
            },
            acces,
            phasage: if input.mentions("site occupe") {
                "Site occupe"
            } else {
                NOT_DETECTED
            },
            environnement: if input.mentions("site classe") || input.mentions("abf") {
                "Secteur protege"
            } else {
                NOT_DETECTED
            },
        };
        Ok(serde_json::to_value(report)?)
    }
}

// ── Consultation rules (RC / CCAP) ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct RulesReport {
    variantes: &'static str,
    penalites: &'static str,
    visite: &'static str,
    sav: &'static str,
}

/// Variants, penalties and site-visit clauses.
pub struct ConsultationRulesClassifier;

impl Classifier for ConsultationRulesClassifier {
    fn name(&self) -> &'static str {
        "RC_CCAP"
    }

    fn classify(&self, input: &AnalysisInput) -> Result<Value> {
        let pick = |needle: &str, found: &'static str| {
            if input.mentions(needle) {
                found
            } else {
                NOT_DETECTED
            }
        };
        let report = RulesReport {
            variantes: pick("variante", "Mentionne"),
            penalites: pick("penalite", "Penalites prevues"),
            visite: pick("visite obligatoire", "Visite obligatoire"),
            sav: pick("garantie", "Garantie mentionnee"),
        };
        Ok(serde_json::to_value(report)?)
    }
}

// ── Bill of quantities (DPGF) ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct QuantitiesReport {
    source: String,
    feuille: Option<String>,
    lignes: usize,
    quantite_totale: i64,
    lignes_ecartees: usize,
    colonnes_manquantes: Vec<&'static str>,
}

/// Runs line-item extraction and reports what it found.
pub struct QuantitiesClassifier;

impl Classifier for QuantitiesClassifier {
    fn name(&self) -> &'static str {
        "DPGF"
    }

    fn classify(&self, input: &AnalysisInput) -> Result<Value> {
        let extraction = extract_line_items(&input.bundle, &input.config)?;
        let report = QuantitiesReport {
            lignes: extraction.items.len(),
            quantite_totale: extraction.items.iter().map(|i| i.quantity).sum(),
            lignes_ecartees: extraction.dropped,
            colonnes_manquantes: extraction.unmapped.iter().map(|f| f.label()).collect(),
            feuille: extraction.sheet,
            source: extraction.candidate.name,
        };
        Ok(serde_json::to_value(report)?)
    }
}

// ── Asbestos ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AsbestosReport {
    mentions: usize,
    vigilances: Vec<&'static str>,
}

/// Only scheduled when "amiante" appears in an entry name or the text.
pub struct AsbestosClassifier;

impl Classifier for AsbestosClassifier {
    fn name(&self) -> &'static str {
        "Amiante"
    }

    fn applies(&self, input: &AnalysisInput) -> bool {
        input.mentioned_in_names("amiante") || input.mentions("amiante")
    }

    fn classify(&self, input: &AnalysisInput) -> Result<Value> {
        let mentions = input.folded.matches("amiante").count();
        let mut vigilances = Vec::new();
        if mentions > 0 {
            vigilances.push("Surveiller coactivite");
        }
        if input.mentions("sous-section 4") || input.mentions("ss4") {
            vigilances.push("Interventions en sous-section 4");
        }
        if input.mentions("joint") {
            vigilances.push("Joints susceptibles de contenir de l'amiante");
        }
        Ok(serde_json::to_value(AsbestosReport {
            mentions,
            vigilances,
        })?)
    }
}

// ── Registry and fan-out ─────────────────────────────────────────────────

/// Ordered set of classifiers.
#[derive(Clone)]
pub struct ClassifierRegistry {
    classifiers: Vec<Arc<dyn Classifier>>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self {
            classifiers: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SpecificationClassifier));
        registry.register(Arc::new(PlansClassifier));
        registry.register(Arc::new(ConsultationRulesClassifier));
        registry.register(Arc::new(QuantitiesClassifier));
        registry.register(Arc::new(AsbestosClassifier));
        registry
    }

    pub fn register(&mut self, classifier: Arc<dyn Classifier>) {
        self.classifiers.push(classifier);
    }

    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn run_one(classifier: &dyn Classifier, input: &AnalysisInput) -> ClassifierOutcome {
    match catch_unwind(AssertUnwindSafe(|| classifier.classify(input))) {
        Ok(Ok(value)) => ClassifierOutcome::Ok(value),
        Ok(Err(e)) => ClassifierOutcome::Failed {
            error: format!("{:#}", e),
        },
        Err(_) => ClassifierOutcome::Failed {
            error: "classifier panicked".to_string(),
        },
    }
}

/// Runs every applicable classifier concurrently.
pub async fn analyze(
    input: Arc<AnalysisInput>,
    registry: &ClassifierRegistry,
) -> BTreeMap<String, ClassifierOutcome> {
    let mut set = JoinSet::new();
    for classifier in &registry.classifiers {
        if !classifier.applies(&input) {
            debug!(classifier = classifier.name(), "classifier not applicable");
            continue;
        }
        let classifier = Arc::clone(classifier);
        let input = Arc::clone(&input);
        set.spawn_blocking(move || {
            let outcome = run_one(classifier.as_ref(), &input);
            (classifier.name(), outcome)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, outcome)) => {
                if let ClassifierOutcome::Failed { error } = &outcome {
                    warn!(classifier = name, error = %error, "classifier failed");
                }
                results.insert(name.to_string(), outcome);
            }
            Err(e) => warn!(error = %e, "classifier task aborted"),
        }
    }
    results
}

/// Extracts the archive text on a blocking thread, then runs the classifiers.
pub async fn analyze_archive(
    bundle: Arc<ArchiveBundle>,
    config: Arc<Config>,
    registry: &ClassifierRegistry,
) -> Result<BTreeMap<String, ClassifierOutcome>> {
    let input = tokio::task::spawn_blocking(move || AnalysisInput::new(bundle, config)).await?;
    Ok(analyze(Arc::new(input), registry).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(entries: Vec<(&str, &str)>) -> Arc<AnalysisInput> {
        let bundle = ArchiveBundle::from_entries(
            entries
                .into_iter()
                .map(|(n, t)| (n.to_string(), t.as_bytes().to_vec())),
        );
        Arc::new(AnalysisInput::new(
            Arc::new(bundle),
            Arc::new(Config::default()),
        ))
    }

    struct Exploding;

    impl Classifier for Exploding {
        fn name(&self) -> &'static str {
            "Exploding"
        }
        fn classify(&self, _input: &AnalysisInput) -> Result<Value> {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn builtins_run_and_failures_are_isolated() {
        let input = input(vec![
            ("CCTP.txt", "Menuiseries PVC, Uw ≤ 1,3. Conformes au DTU 36.5. Site occupé, nacelle."),
            ("RC.txt", "Les variantes sont autorisées. Pénalités de retard."),
        ]);
        let mut registry = ClassifierRegistry::with_builtins();
        registry.register(Arc::new(Exploding));
        let results = analyze(input, &registry).await;

        assert!(!results.contains_key("Amiante"));
        let ClassifierOutcome::Ok(cctp) = &results["CCTP"] else {
            panic!("CCTP failed");
        };
        assert_eq!(cctp["materiaux"], serde_json::json!(["PVC"]));
        assert_eq!(cctp["performances"]["Uw"], "detecte");
        assert_eq!(cctp["normes"], serde_json::json!(["DTU 36.5"]));

        let ClassifierOutcome::Ok(plans) = &results["Plans"] else {
            panic!("Plans failed");
        };
        assert_eq!(plans["acces"], "Nacelle necessaire");
        assert_eq!(plans["phasage"], "Site occupe");

        let ClassifierOutcome::Ok(rules) = &results["RC_CCAP"] else {
            panic!("RC_CCAP failed");
        };
        assert_eq!(rules["variantes"], "Mentionne");
        assert_eq!(rules["penalites"], "Penalites prevues");

        // No tabular entry: the DPGF classifier fails on its own.
        assert!(matches!(&results["DPGF"], ClassifierOutcome::Failed { error } if error.contains("no quantitative table")));
        assert_eq!(
            results["Exploding"],
            ClassifierOutcome::Failed {
                error: "classifier panicked".to_string()
            }
        );
    }

    #[tokio::test]
    async fn asbestos_is_scheduled_from_entry_names() {
        let input = input(vec![
            ("Diagnostic_Amiante.txt", "Joints de vitrage"),
            ("DQE.csv", "Désignation;Qté\nFenêtre 1200x1000;2\nPorte;1\n"),
        ]);
        let results = analyze(input, &ClassifierRegistry::with_builtins()).await;
        let ClassifierOutcome::Ok(asbestos) = &results["Amiante"] else {
            panic!("Amiante failed");
        };
        assert_eq!(
            asbestos["vigilances"],
            serde_json::json!(["Joints susceptibles de contenir de l'amiante"])
        );

        let ClassifierOutcome::Ok(dpgf) = &results["DPGF"] else {
            panic!("DPGF failed");
        };
        assert_eq!(dpgf["lignes"], 2);
        assert_eq!(dpgf["quantite_totale"], 3);
        assert_eq!(dpgf["source"], "DQE.csv");
        assert!(dpgf["colonnes_manquantes"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("Repère")));
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_report() {
        let registry = ClassifierRegistry::new();
        assert!(registry.is_empty());
        let bundle = ArchiveBundle::from_entries([("notes.txt", b"amiante".to_vec())]);
        let results = analyze_archive(Arc::new(bundle), Arc::new(Config::default()), &registry)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}

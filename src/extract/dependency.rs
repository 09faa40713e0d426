//! Rule-based triple extraction over a dependency parse.
//!
//! The rules look at the root verb of each sentence and its direct
//! dependents. Both spaCy/ClearNLP labels (`nsubj`, `dobj`, `prep`/`pobj`)
//! and Universal Dependencies labels (`nsubj:pass`, `obj`, `obl`/`case`) are
//! understood, so any parser emitting CoNLL-U can feed it.

use async_trait::async_trait;

use super::conllu::{parse_conllu, Sentence, Token};
use crate::error::Result;
use crate::triple::Triple;

const SUBJECT_LABELS: &[&str] = &["nsubj", "nsubjpass", "nsubj:pass"];
const OBJECT_LABELS: &[&str] = &["dobj", "obj", "attr", "oprd"];
const MODIFIER_LABELS: &[&str] = &["det", "amod", "compound", "poss", "nmod:poss", "flat", "flat:name"];

/// Source of dependency parses
#[async_trait]
pub trait DependencyParser: Send + Sync {
    /// Parse raw text into sentences
    async fn parse(&self, text: &str) -> Result<Vec<Sentence>>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Input that is already CoNLL-U (offline, no parser service involved)
pub struct ConlluInput;

#[async_trait]
impl DependencyParser for ConlluInput {
    async fn parse(&self, text: &str) -> Result<Vec<Sentence>> {
        parse_conllu(text)
    }

    fn name(&self) -> &str {
        "conllu"
    }
}

fn has_label(token: &Token, labels: &[&str]) -> bool {
    labels.iter().any(|l| token.deprel.eq_ignore_ascii_case(l))
}

fn is_oblique(token: &Token) -> bool {
    let rel = token.deprel.to_ascii_lowercase();
    rel == "obl" || rel.starts_with("obl:")
}

/// The token plus its determiner/adjective/compound/possessive dependents
fn phrase(sentence: &Sentence, head: &Token) -> String {
    let mut parts: Vec<&Token> = vec![head];
    parts.extend(
        sentence
            .children(head.id)
            .filter(|c| has_label(c, MODIFIER_LABELS)),
    );
    parts.sort_by_key(|t| t.id);
    parts
        .iter()
        .map(|t| t.form.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Apply the root-verb rules to one sentence
pub fn extract_from_sentence(sentence: &Sentence) -> Option<Triple> {
    let verb = sentence
        .tokens
        .iter()
        .find(|t| t.upos == "VERB" && t.deprel.eq_ignore_ascii_case("root"))?;

    let mut subject: Option<String> = None;
    let mut direct_object: Option<String> = None;
    // (object phrase, preposition)
    let mut prepositional: Option<(String, String)> = None;

    for child in sentence.children(verb.id) {
        if has_label(child, SUBJECT_LABELS) {
            subject = Some(phrase(sentence, child));
        } else if has_label(child, OBJECT_LABELS) {
            direct_object = Some(phrase(sentence, child));
        } else if child.deprel.eq_ignore_ascii_case("prep") {
            if prepositional.is_none() {
                prepositional = sentence
                    .children(child.id)
                    .find(|g| g.deprel.eq_ignore_ascii_case("pobj"))
                    .map(|pobj| (phrase(sentence, pobj), child.form.clone()));
            }
        } else if is_oblique(child) && prepositional.is_none() {
            prepositional = sentence
                .children(child.id)
                .find(|g| g.deprel.eq_ignore_ascii_case("case"))
                .map(|case| (phrase(sentence, child), case.form.clone()));
        }
    }

    let lemma = verb.lemma_or_form();
    let (predicate, object) = match (direct_object, prepositional) {
        (Some(obj), _) => (lemma.to_string(), obj),
        (None, Some((obj, prep))) => (format!("{} {}", lemma, prep), obj),
        (None, None) => return None,
    };

    let triple = Triple::new(subject?, predicate, object);
    triple.is_complete().then_some(triple)
}

/// Apply the rules to every sentence, at most one triple per sentence
pub fn extract_from_sentences(sentences: &[Sentence]) -> Vec<Triple> {
    sentences.iter().filter_map(extract_from_sentence).collect()
}

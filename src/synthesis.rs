//! Grounded answer generation from retrieved articles.

use anyhow::{Context, Result};

use crate::llm::Completer;
use crate::models::{ChatResponse, SearchHit, SourceRef};

/// Returned instead of calling the model when retrieval found nothing.
pub const NO_EVIDENCE_ANSWER: &str = "Ik heb in de beschikbare wetteksten geen bepalingen \
gevonden die deze vraag beantwoorden. Probeer de vraag specifieker te formuleren of noem \
de wet of het artikel waar het om gaat.";

pub fn build_system_prompt() -> String {
    "Je bent Beleidsbank, een assistent voor Nederlandse wet- en regelgeving. \
Beantwoord de vraag uitsluitend op basis van de meegeleverde wetsartikelen. \
Verwijs naar de artikelen met hun nummer tussen blokhaken, bijvoorbeeld [1]. \
Citeer letterlijk waar de precieze formulering ertoe doet. \
Als de artikelen de vraag niet beantwoorden, zeg dat dan eerlijk en verzin niets. \
Antwoord in het Nederlands, beknopt en zonder juridisch advies te geven."
        .to_string()
}

/// Numbered evidence block: `[n] label`, text, `Bron: url`.
pub fn build_context_block(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let mut entry = format!("[{}] {}\n{}", i + 1, hit.label, hit.text.trim());
            if !hit.source_url.is_empty() {
                entry.push_str(&format!("\nBron: {}", hit.source_url));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_message(question: &str, context: &str) -> String {
    format!("Wetsartikelen:\n\n{context}\n\nVraag: {}", question.trim())
}

pub fn source_refs(hits: &[SearchHit]) -> Vec<SourceRef> {
    hits.iter()
        .map(|hit| SourceRef {
            label: hit.label.clone(),
            url: hit.source_url.clone(),
            document_id: hit.document_id.clone(),
            score: hit.score,
        })
        .collect()
}

/// Ask the completion model to answer from `hits`. The model output is
/// passed through as is. Without evidence the model is not called.
pub async fn synthesize(
    completer: &dyn Completer,
    question: &str,
    hits: &[SearchHit],
) -> Result<ChatResponse> {
    if hits.is_empty() {
        return Ok(ChatResponse {
            answer: NO_EVIDENCE_ANSWER.to_string(),
            sources: Vec::new(),
        });
    }

    let context = build_context_block(hits);
    let answer = completer
        .complete(&build_system_prompt(), &build_user_message(question, &context))
        .await
        .context("Answer generation failed")?;

    Ok(ChatResponse {
        answer,
        sources: source_refs(hits),
    })
}

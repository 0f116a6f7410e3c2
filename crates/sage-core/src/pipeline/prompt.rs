//! Stage prompt composition
//!
//! Pure functions. The persona's instruction text travels separately as the
//! system message; these build the user message for each stage.

use crate::persona::Persona;

/// User prompt for stage 1: the question plus the persona's core concepts
pub fn build_stage1_prompt(question: &str, persona: &Persona) -> String {
    format!(
        "使用者的問題是：「{question}」\n\n\
         請以這位思想家的核心觀念進行深度思考：\n{concepts}\n\n\
         產生 4-6 條推理步驟，每條標明 Step 編號。",
        question = question,
        concepts = persona.core_concepts,
    )
}

/// User prompt for stage 2: the question plus the complete reasoning chain
///
/// The chain is embedded verbatim.
pub fn build_stage2_prompt(question: &str, reasoning_chain: &str, _persona: &Persona) -> String {
    format!(
        "使用者的原始問題：「{question}」\n\n\
         以下是 Stage1 產生的推理鏈：\n{reasoning_chain}\n\n\
         請根據上述每一條推理步驟，提供對應的具體建議，最後給出總結。",
    )
}

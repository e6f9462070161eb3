//! Prompt construction for question and tip generation.

use std::fmt::Write as _;

use crate::schema::{GeneratedQuestion, QuestionGenerationRequest};

pub const QUESTION_SYSTEM_ROLE: &str =
    "You are an expert question generator in the context of interviews.";

pub const TIP_SYSTEM_ROLE: &str =
    "You are an expert tip generator in the context of technical interviews.";

const QUESTION_FINAL_INSTRUCTIONS: &str = "FINAL INSTRUCTIONS:\n\
    Reason step by step internally to arrive at the best FINAL_QUESTION, \
    but do not include any of that reasoning in your output. \
    Only provide the FINAL_QUESTION below.\n\n\
    FINAL_QUESTION:\n";

const TIP_FINAL_INSTRUCTIONS: &str = "FINAL INSTRUCTIONS:\n\
    Reason step by step internally to arrive at the best TIP, \
    but do not include any of that reasoning in your output. \
    Only provide the FINAL_TIP below.\n\n\
    FINAL_TIP:\n";

const PREVIOUS_QUESTIONS_HEADER: &str = "ADDITIONAL CONSTRAINTS:\n\
    Ensure that this QUESTION is unique and different from the following \
    previously generated questions:\n";

const PREVIOUS_TIPS_HEADER: &str = "CONSTRAINTS:\n\
    Ensure that the generated TIP is unique and different from the following tips:\n";

const SECTION_FORMAT: &str = "FORMAT:\n\
    Answer in plain text using exactly these labelled sections, each starting on its own line:\n\
    Question: <the question>\n\
    Expected Answer: <the expected answer>\n\
    Evaluation Criteria: <comma separated keywords>\n\
    Expected Duration: <time needed to answer>\n\n";

/// Prompt asking for one structured question.
pub fn question_prompt(request: &QuestionGenerationRequest, previous: &[String]) -> String {
    let mut prompt = question_task(request);
    push_previous(&mut prompt, PREVIOUS_QUESTIONS_HEADER, "PREVIOUS QUESTION", previous);
    prompt.push_str(QUESTION_FINAL_INSTRUCTIONS);
    prompt
}

/// Prompt asking for one question as labelled plain-text sections, for streaming.
pub fn question_stream_prompt(request: &QuestionGenerationRequest, previous: &[String]) -> String {
    let mut prompt = question_task(request);
    push_previous(&mut prompt, PREVIOUS_QUESTIONS_HEADER, "PREVIOUS QUESTION", previous);
    prompt.push_str(SECTION_FORMAT);
    prompt.push_str(QUESTION_FINAL_INSTRUCTIONS);
    prompt
}

/// Prompt asking for one short tip about `question`.
pub fn tip_prompt(question: &GeneratedQuestion, previous: &[String]) -> String {
    let request = &question.request;
    let mut prompt = format!(
        "I need you to perform a TASK about this QUESTION:\n{}\n\n\
         CONTEXT:\n\
         During a {} interview, this {} QUESTION was asked to test a candidate's {} skill.\n\
         The ANSWER to the QUESTION is {} and the candidate will be evaluated on the \
         following criteria: {}.\n\n\
         TASK:\n\
         Generate one short and concise FINAL_TIP to help the candidate answer the QUESTION. \
         Do not reveal the ANSWER; only give one short consideration to think about.\n\n",
        question.content.question,
        request.job_title,
        request.question_type,
        request.skill_to_test,
        question.content.expected_answer,
        question.content.evaluation_criteria,
    );
    push_previous(&mut prompt, PREVIOUS_TIPS_HEADER, "PREVIOUS TIP", previous);
    prompt.push_str(TIP_FINAL_INSTRUCTIONS);
    prompt
}

fn question_task(request: &QuestionGenerationRequest) -> String {
    format!(
        "TASK:\n\
         Generate a {} FINAL_QUESTION for a {} to test their skill in {}.\n\n\
         CONSTRAINTS:\n\
         Make sure this FINAL_QUESTION includes the following elements:\n\
         - the expected_answer of the FINAL_QUESTION\n\
         - the expected_duration to answer the FINAL_QUESTION\n\
         - a list of generic evaluation_criteria to assess the quality of the answer. \
         The criteria must not be job specific, must be distinct and must not overlap. \
         Give keywords only, without definitions.\n\n",
        request.question_type, request.job_title, request.skill_to_test,
    )
}

fn push_previous(prompt: &mut String, header: &str, label: &str, previous: &[String]) {
    if previous.is_empty() {
        return;
    }
    prompt.push_str(header);
    for (index, text) in previous.iter().enumerate() {
        let _ = writeln!(prompt, "- {label} {index}: {text}");
    }
    prompt.push('\n');
}

//! Prompt text for every generation.
//!
//! Structured prompts spell out the exact JSON shape expected back; the
//! matching DTOs live in [`crate::extract`].

use endstate_core::learning::{CapstoneSubmission, RubricCriterion};
use endstate_core::types::ProjectSummary;
use endstate_core::{ChatMessage, NodeLabel, RelType, SkillNode};

pub const TUTOR_SYSTEM: &str = "\
You are Endstate, a Socratic tutor helping a learner pick a hands-on project \
and plan what they need to learn to build it.

- Ask one focused question at a time about their background, experience \
level, goals, interests, and how much time they can commit.
- Guide rather than lecture: prompt the learner to reason things out, and \
keep answers short unless they ask for depth.
- Once you understand them, propose a concrete project and refine it \
together until they agree on it.
- After agreement, outline the topics, skills, and concepts the project \
needs, from foundations upward.
- Never write the project for them.";

const JSON_ONLY: &str = "Respond with a single JSON document and nothing else.";

/// `role: content` lines, oldest first.
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_system() -> String {
    format!(
        "You extract a structured summary from a tutoring conversation. {JSON_ONLY}\n\
         Shape:\n\
         {{\n\
           \"user_profile\": {{\"background\": string|null, \"experience_level\": string|null, \
         \"goals\": [string], \"interests\": [string], \"time_commitment\": string|null}},\n\
           \"agreed_project\": {{\"title\": string, \"description\": string, \"deliverables\": [string]}} | null,\n\
           \"topics\": [string], \"skills\": [string], \"concepts\": [string]\n\
         }}\n\
         Only include a project the learner explicitly agreed to. Use null or empty \
         lists for anything not discussed."
    )
}

pub fn suggestions_system(interests: &[String]) -> String {
    let interests = if interests.is_empty() {
        "Infer the learner's interests from the conversation.".to_string()
    } else {
        format!("The learner is interested in: {}.", interests.join(", "))
    };
    format!(
        "You propose hands-on projects for a learner. {interests} \
         Suggest three projects of increasing difficulty that fit their level. {JSON_ONLY}\n\
         Shape: {{\"projects\": [{{\"title\": string, \"description\": string, \
         \"difficulty\": \"beginner\"|\"intermediate\"|\"advanced\", \"skills\": [string]}}]}}"
    )
}

/// Allowed labels and relationship triples, one per line.
pub fn graph_schema() -> String {
    let labels: Vec<&str> = NodeLabel::ALL.iter().map(|l| l.as_str()).collect();
    let mut lines = vec![format!("Allowed node labels: {}.", labels.join(", "))];
    lines.push("Allowed relationships (source -[TYPE]-> target):".to_string());
    for rel in RelType::ALL {
        for source in NodeLabel::ALL {
            for target in NodeLabel::ALL {
                if rel.allows(source, target) {
                    lines.push(format!("- ({source})-[:{rel}]->({target})"));
                }
            }
        }
    }
    lines.join("\n")
}

pub fn graph_system() -> String {
    format!(
        "You design a learning plan as a knowledge graph for the learner's agreed project. \
         Every relationship except RELATED_TO means the source needs the target to be \
         learned first. Break the project into topics, skills, and atomic concepts; \
         keep names short and unique.\n\
         {schema}\n\
         {JSON_ONLY}\n\
         Shape: {{\"nodes\": [{{\"label\": string, \"name\": string, \"description\": string}}], \
         \"relationships\": [{{\"source\": node name, \"target\": node name, \"type\": string}}]}}",
        schema = graph_schema(),
    )
}

pub fn graph_user(summary: &ProjectSummary) -> String {
    let project = summary
        .agreed_project
        .as_ref()
        .map(|p| {
            format!(
                "Project: {}\n{}\nDeliverables: {}",
                p.title,
                p.description,
                p.deliverables.join("; ")
            )
        })
        .unwrap_or_else(|| "No project agreed yet; plan around the learner's goals.".to_string());
    let profile = &summary.user_profile;
    format!(
        "{project}\n\
         Learner level: {}\n\
         Goals: {}\n\
         Known topics: {}\nKnown skills: {}\nKnown concepts: {}",
        profile.experience_level.as_deref().unwrap_or("unknown"),
        profile.goals.join("; "),
        summary.topics.join(", "),
        summary.skills.join(", "),
        summary.concepts.join(", "),
    )
}

pub fn lesson_system() -> String {
    format!(
        "You write concise, practical lessons for one node of a learning plan. \
         Build on the listed prerequisites without re-teaching them. {JSON_ONLY}\n\
         Shape: {{\"title\": string, \"summary\": string, \"objectives\": [string], \
         \"sections\": [{{\"heading\": string, \"body\": string}}]}}"
    )
}

pub fn node_user(node: &SkillNode, prerequisites: &[String]) -> String {
    let prerequisites = if prerequisites.is_empty() {
        "none".to_string()
    } else {
        prerequisites.join(", ")
    };
    format!(
        "{label}: {name}\nDescription: {description}\nPrerequisites: {prerequisites}",
        label = node.label,
        name = node.name,
        description = node.description,
    )
}

pub fn assessment_system(questions: usize) -> String {
    format!(
        "You write multiple-choice assessments. Write {questions} questions that test \
         understanding of the node below, each with four choices and exactly one correct \
         answer. Tag each question with the specific concept it probes. {JSON_ONLY}\n\
         Shape: {{\"questions\": [{{\"prompt\": string, \"choices\": [string], \
         \"answer_index\": integer (0-based), \"concept\": string}}]}}"
    )
}

pub fn weak_concepts_system() -> String {
    format!(
        "A learner failed an assessment. From the questions they missed, name the \
         underlying concepts they should review before retrying, most fundamental first, \
         at most three. {JSON_ONLY}\n\
         Shape: {{\"concepts\": [string]}}"
    )
}

pub fn capstone_system(rubric: &[RubricCriterion]) -> String {
    let criteria: Vec<String> = rubric
        .iter()
        .map(|c| format!("- {} (weight {:.2}): {}", c.name, c.weight, c.description))
        .collect();
    format!(
        "You evaluate a learner's capstone project against a fixed rubric. Score each \
         criterion from 0 to 10 with one or two sentences of feedback.\n\
         Rubric:\n{criteria}\n\
         {JSON_ONLY}\n\
         Shape: {{\"scores\": [{{\"criterion\": string, \"score\": number, \"feedback\": string}}], \
         \"summary\": string}}",
        criteria = criteria.join("\n"),
    )
}

pub fn capstone_user(summary: Option<&ProjectSummary>, submission: &CapstoneSubmission) -> String {
    let agreed = summary
        .and_then(|s| s.agreed_project.as_ref())
        .map(|p| format!("Agreed project: {}\n{}\n", p.title, p.description))
        .unwrap_or_default();
    format!(
        "{agreed}Submission: {}\nRepository: {}\n{}",
        submission.title,
        submission.repository_url.as_deref().unwrap_or("not provided"),
        submission.description,
    )
}

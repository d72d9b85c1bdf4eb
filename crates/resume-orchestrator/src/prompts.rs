// Prompt templates for each step role.
// Templates use `{placeholder}` markers replaced by `build_prompt`.

use crate::catalog::StepRole;
use crate::executor::StepContext;

/// Marker a judge uses to pick one candidate verbatim.
pub const SELECTION_MARKER: &str = "SELECTED:";

/// Shared preamble for every step.
pub const SYSTEM_PREAMBLE: &str = "You are an expert resume writer and career coach. \
    You tailor resumes to a specific job description without inventing experience, \
    employers, dates, degrees or metrics that are not present in the original resume.";

/// Output rule for steps that return a full resume.
pub const RESUME_OUTPUT_RULE: &str = "Respond with the complete resume text only. \
    Do NOT add commentary before or after it. Do NOT use markdown code fences.";

const ANALYZE_TEMPLATE: &str = "Analyze how well the resume matches the job description.

List:
1. The hard requirements of the role and whether the resume shows evidence for each
2. The most important keywords missing from the resume
3. Experience in the resume that is relevant but under-emphasized
4. Content that is irrelevant to this role

Be concise and specific. Do NOT rewrite the resume.";

const STRATEGIZE_TEMPLATE: &str = "Using the analysis provided, produce a positioning plan for the rewrite.

Cover:
1. The headline narrative the resume should convey for this role
2. Which experiences to lead with and which to shorten
3. Where each missing keyword can be incorporated truthfully
4. Section ordering

Do NOT rewrite the resume.";

const WRITE_TEMPLATE: &str = "Rewrite the original resume so it is tailored to the job description. \
Use any analysis or plan provided. Mirror the job's language where the resume supports it, \
lead with the most relevant achievements, and keep every fact traceable to the original.

{resume_output_rule}";

const REFINE_TEMPLATE: &str = "Improve the current draft for this job description. \
Tighten wording, strengthen action verbs, quantify impact where the original resume gives numbers, \
and fix any claim that is not supported by the original resume.

{resume_output_rule}";

const CRITIQUE_TEMPLATE: &str = "Critically review the current draft as a hiring manager for this role.

List every concrete problem you find: unsupported claims, missing requirements, weak or vague bullets, \
keyword gaps, formatting issues. For each problem give a specific fix.

Do NOT rewrite the resume.";

const REVISE_TEMPLATE: &str = "Revise the current draft to address every point in the critique. \
Where a critique point asks for something the original resume cannot support, leave it out.

{resume_output_rule}";

const EDIT_TEMPLATE: &str = "Copy-edit the current draft. Fix grammar, punctuation, tense consistency \
and formatting. Keep the content and structure unless a sentence is unclear.

{resume_output_rule}";

const SYNTHESIZE_TEMPLATE: &str = "Several candidate resumes were written independently for this job. \
Merge them into one resume that keeps the strongest bullet for each experience, \
the clearest summary and the best keyword coverage. Do not include anything absent from the original resume.

{resume_output_rule}";

const JUDGE_TEMPLATE: &str = "Several candidate resumes were written independently for this job. \
Decide which is the best fit for the role.

If one candidate is clearly best, respond with a first line of exactly `{marker} <number>` \
(for example `{marker} 2`) and nothing else.
Otherwise respond with a merged resume combining the best parts of the candidates.

{resume_output_rule}";

/// Role-specific instruction block.
#[must_use]
pub fn instructions(role: StepRole) -> String {
    let template = match role {
        StepRole::Analyze => ANALYZE_TEMPLATE,
        StepRole::Strategize => STRATEGIZE_TEMPLATE,
        StepRole::Write => WRITE_TEMPLATE,
        StepRole::Refine => REFINE_TEMPLATE,
        StepRole::Critique => CRITIQUE_TEMPLATE,
        StepRole::Revise => REVISE_TEMPLATE,
        StepRole::Edit => EDIT_TEMPLATE,
        StepRole::Synthesize => SYNTHESIZE_TEMPLATE,
        StepRole::Judge => JUDGE_TEMPLATE,
    };
    template
        .replace("{resume_output_rule}", RESUME_OUTPUT_RULE)
        .replace("{marker}", SELECTION_MARKER)
}

/// Builds the full prompt for a step.
///
/// Sections appear in a fixed order: instructions, job description, original
/// resume, accumulated notes, current draft, candidates.
#[must_use]
pub fn build_prompt(role: StepRole, context: &StepContext) -> String {
    let mut prompt = format!("{SYSTEM_PREAMBLE}\n\n{}\n", instructions(role));

    prompt.push_str("\nJOB DESCRIPTION:\n");
    prompt.push_str(context.job_description.trim());
    prompt.push_str("\n\nORIGINAL RESUME:\n");
    prompt.push_str(context.resume_text.trim());
    prompt.push('\n');

    for note in &context.notes {
        prompt.push_str(&format!("\n{} NOTES:\n{}\n", note.role.to_string().to_uppercase(), note.text.trim()));
    }

    if let Some(draft) = &context.draft {
        prompt.push_str("\nCURRENT DRAFT:\n");
        prompt.push_str(draft.trim());
        prompt.push('\n');
    }

    for (i, candidate) in context.candidates.iter().enumerate() {
        prompt.push_str(&format!("\nCANDIDATE {}:\n{}\n", i + 1, candidate.trim()));
    }

    prompt
}

/// How a judge answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeVerdict {
    /// Zero-based index of the chosen candidate.
    Selected(usize),
    /// The judge produced its own merged text.
    Merged(String),
}

/// Interprets a judge's reply against `candidates` candidates.
///
/// A first line `SELECTED: <n>` with `1 <= n <= candidates` selects that
/// candidate. Anything else is a merge; a marker line naming an invalid
/// candidate is stripped from the merged text.
#[must_use]
pub fn parse_judge_reply(reply: &str, candidates: usize) -> JudgeVerdict {
    let trimmed = reply.trim_start();
    let (first_line, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));

    let Some(choice) = first_line.trim().strip_prefix(SELECTION_MARKER) else {
        return JudgeVerdict::Merged(reply.trim().to_string());
    };

    match choice.trim().trim_end_matches('.').parse::<usize>() {
        Ok(n) if (1..=candidates).contains(&n) => JudgeVerdict::Selected(n - 1),
        _ => JudgeVerdict::Merged(rest.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StepNote;

    fn context() -> StepContext {
        StepContext::new("Jane Doe\nRust engineer", "Senior Rust developer wanted")
    }

    #[test]
    fn test_prompt_contains_inputs() {
        let prompt = build_prompt(StepRole::Write, &context());
        assert!(prompt.contains("JOB DESCRIPTION:\nSenior Rust developer wanted"));
        assert!(prompt.contains("ORIGINAL RESUME:\nJane Doe\nRust engineer"));
        assert!(prompt.contains(RESUME_OUTPUT_RULE));
        assert!(!prompt.contains("CURRENT DRAFT"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_revise_sees_draft_and_critique() {
        let mut ctx = context();
        ctx.draft = Some("Draft v1".to_string());
        ctx.notes.push(StepNote { role: StepRole::Critique, text: "Too vague".to_string() });

        let prompt = build_prompt(StepRole::Revise, &ctx);
        assert!(prompt.contains("CRITIQUE NOTES:\nToo vague"));
        assert!(prompt.contains("CURRENT DRAFT:\nDraft v1"));
    }

    #[test]
    fn test_candidates_are_numbered_from_one() {
        let mut ctx = context();
        ctx.candidates = vec!["A".to_string(), "B".to_string()];
        let prompt = build_prompt(StepRole::Judge, &ctx);
        assert!(prompt.contains("CANDIDATE 1:\nA"));
        assert!(prompt.contains("CANDIDATE 2:\nB"));
        assert!(prompt.contains("`SELECTED: <number>`"));
    }

    #[test]
    fn test_parse_judge_selection() {
        assert_eq!(parse_judge_reply("SELECTED: 2", 3), JudgeVerdict::Selected(1));
        assert_eq!(parse_judge_reply("  SELECTED: 1.\nbecause", 3), JudgeVerdict::Selected(0));
    }

    #[test]
    fn test_parse_judge_merge() {
        assert_eq!(
            parse_judge_reply("Merged resume\nline two", 3),
            JudgeVerdict::Merged("Merged resume\nline two".to_string())
        );
        assert_eq!(
            parse_judge_reply("SELECTED: 7\nMerged resume", 3),
            JudgeVerdict::Merged("Merged resume".to_string())
        );
        assert_eq!(
            parse_judge_reply("SELECTED: none\nMerged", 3),
            JudgeVerdict::Merged("Merged".to_string())
        );
    }
}

// Prompt constants for resume + cover letter generation.

/// Marker that opens the resume section of the model's reply.
pub const RESUME_MARKER: &str = "=== RESUME ===";

/// Marker that opens the cover letter section of the model's reply.
pub const COVER_LETTER_MARKER: &str = "=== COVER LETTER ===";

/// Generation prompt template.
/// Replace: {resume_marker}, {cover_letter_marker}, {job_text}, {full_name},
///          {email}, {education}, {strengths}, {wins}, {goals}, {experience}
pub const GENERATION_PROMPT_TEMPLATE: &str = r#"You are a professional resume and cover letter writer. Based on the information below, write:

1. A personalized resume
2. A cover letter tailored to the job

Respond with the resume and the cover letter only. Do not add instructions, notes, or placeholders. Use markdown formatting (**bold**, *italic*, ### headers) in both documents.
Respond in exactly this format so the two documents can be separated:

{resume_marker}
[resume here]

{cover_letter_marker}
[cover letter here]


Job post (cater to the company's values if present): {job_text}

Candidate info (if a field is blank or very brief, come up with realistic attributes that suit the job):
- Name: {full_name}
- Email: {email}
- Education (adapt it to what the job post asks for; e.g. a marketing degree can be framed for a business role): {education}
- Strengths (draw on these; if only one is given, extend it with strengths typical for the field): {strengths}
- Achievements (personal wins count too; translate them into workplace strengths): {wins}
- Goals for the next job (use as a short motivation for applying): {goals}
- Work experience (role, company, timeframe and one takeaway per employment):
{experience}

The resume should be clean, professional, and written in bullet points.
The cover letter should be compelling, customized to the job, and aligned with the company's values where they can be inferred from the job post."#;

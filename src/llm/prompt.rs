//! Prompt text for chat answers and transcription

use super::types::{Content, GenerateContentRequest, GenerationConfig, Part, SafetySetting};

pub const COLLEGE_NAME: &str = "Grace College of Engineering";

const COLLEGE_INFO: &str = "\
Grace College of Engineering (https://grace.edu.in/) is an educational institution in Tamil Nadu, India.

Key Information:
- Location: Thoothukudi district, Tamil Nadu, India
- Established: The institute was established to provide quality technical education to students
- Vision: To be a premier technical institution through excellence in education and research
- Mission: To impart quality technical education with ethical values and prepare students for industry needs
- Accreditation: Accredited by the All India Council for Technical Education (AICTE)

Academic Programs:
- B.E. in Computer Science and Engineering
- B.E. in Mechanical Engineering
- B.E. in Electrical and Electronics Engineering
- B.E. in Electronics and Communication Engineering
- B.E. in Civil Engineering

Facilities:
- Modern laboratories and research facilities
- Library with extensive technical resources
- Computer labs with high-speed internet
- Sports facilities and gymnasium
- Separate hostels for boys and girls
- Transportation facilities for students

Student Activities:
- Technical symposiums and workshops
- Cultural events and festivals
- Sports tournaments
- Industry visits and internships
- Placement training programs

Admission Process:
- Admissions are based on state-level engineering entrance exams
- Lateral entry is available for diploma holders
- Management quota seats are also available

Placements:
- Dedicated training and placement cell
- Collaborations with various industries
- Pre-placement training programs
- Regular campus recruitment drives
";

const TRANSCRIPTION_PROMPT: &str = "\
Transcribe the following audio recording. The audio contains a question or statement for a college chatbot.
The speaker is likely asking about admissions, programs, deadlines, scholarships, campus life, or other college topics.
Return only the transcribed text, without any additional commentary.";

/// Single-turn prompt: persona, reference facts, then the question
pub fn chat_prompt(question: &str) -> String {
    format!(
        "You are the AI assistant for {name} in Tamil Nadu, India.
Provide helpful, accurate information about the college's programs, admissions, faculty,
and facilities. Use the following information about the college in your responses:

{info}
If you don't know something specific about the college beyond what's provided, acknowledge that
you don't have that specific information but offer to help with general engineering education questions.
Be friendly, professional and concise in your responses.

User question: {question}",
        name = COLLEGE_NAME,
        info = COLLEGE_INFO,
        question = question.trim(),
    )
}

pub fn chat_request(question: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::user(vec![Part::text(chat_prompt(question))])],
        safety_settings: SafetySetting::standard(),
        generation_config: None,
    }
}

/// Transcription request with the audio attached inline
pub fn transcription_request(mime_type: &str, audio_base64: String) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::user(vec![
            Part::text(TRANSCRIPTION_PROMPT),
            Part::inline(mime_type, audio_base64),
        ])],
        safety_settings: SafetySetting::standard(),
        generation_config: Some(GenerationConfig {
            temperature: Some(0.1),
            max_output_tokens: Some(100),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_prompt_ends_with_question() {
        let prompt = chat_prompt("  What programs do you offer?\n");
        assert!(prompt.contains("B.E. in Civil Engineering"));
        assert!(prompt.ends_with("User question: What programs do you offer?"));
    }

    #[test]
    fn test_transcription_request_shape() {
        let request = transcription_request("audio/wav", "AAAA".to_string());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["mimeType"], "audio/wav");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "AAAA");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 100);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["category"], "HARM_CATEGORY_HARASSMENT");
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn test_chat_request_has_no_generation_config() {
        let json = serde_json::to_value(chat_request("hi")).unwrap();
        assert!(json.get("generationConfig").is_none());
    }
}

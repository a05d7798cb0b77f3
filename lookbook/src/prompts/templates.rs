//! Instruction and fallback templates.

use super::settings::{GenerationSettings, ProductType, present};

/// Short description of the person to render, from whatever settings are present
fn describe_model(settings: &GenerationSettings) -> String {
    let mut subject = String::from("a model");
    match (present(&settings.age), present(&settings.gender)) {
        (Some(age), Some(gender)) => subject = format!("a {age}-year-old {gender} model"),
        (Some(age), None) => subject = format!("a {age}-year-old model"),
        (None, Some(gender)) => subject = format!("a {gender} model"),
        (None, None) => {}
    }
    if let Some(hair) = present(&settings.hair_style) {
        subject.push_str(&format!(" with {hair} hair"));
    }
    subject
}

fn scene_details(settings: &GenerationSettings) -> Vec<String> {
    let mut details = Vec::new();
    if let Some(pose) = present(&settings.pose) {
        details.push(format!("pose: {pose}"));
    }
    if let Some(location) = present(&settings.location) {
        details.push(format!("location: {location}"));
    }
    if let Some(color) = present(&settings.garment_color) {
        details.push(format!("garment color: {color}"));
    }
    if let Some(lighting) = present(&settings.lighting) {
        details.push(format!("lighting: {lighting}"));
    }
    if let Some(mood) = present(&settings.mood) {
        details.push(format!("mood: {mood}"));
    }
    details
}

/// Instruction asking a language model to rewrite the user's prompt for the image model
pub fn build_enhancement_instruction(original: &str, settings: &GenerationSettings, has_combined_input: bool) -> String {
    let product = match settings.product_type() {
        ProductType::Jewelry => "jewelry piece",
        ProductType::Clothing => "garment",
        ProductType::Accessory => "accessory",
        ProductType::Other => "product",
    };

    let mut instruction = format!(
        "Rewrite the request below as a single prompt for an image-editing model that places the {product} \
         from the reference image on {}. Keep the product exactly as shown.",
        describe_model(settings)
    );
    if has_combined_input {
        instruction.push_str(
            " The reference is two photos side by side: the person on the left, the product on the right. \
             Put the product from the right on the person from the left.",
        );
    }
    let details = scene_details(settings);
    if !details.is_empty() {
        instruction.push_str(&format!(" Respect these settings: {}.", details.join("; ")));
    }
    instruction.push_str(" Reply with the prompt only, in one paragraph.");
    instruction.push_str(&format!("\n\nRequest: {}", original.trim()));
    instruction
}

/// Prompt used when no language model output is available
pub fn fallback_prompt(original: &str, settings: &GenerationSettings, has_combined_input: bool) -> String {
    let subject = describe_model(settings);
    let mut prompt = if has_combined_input {
        format!(
            "Take the item from the right image and place it naturally on the person from the left image, \
             shown as {subject}. Preserve the item's exact design, color and material."
        )
    } else if settings.product_type().is_apparel() {
        format!("Professional fashion photo of {subject} wearing the garment from the reference image, true to its cut and fabric.")
    } else {
        format!("Professional jewelry photo of {subject} wearing the piece from the reference image, sharp detail on the metal and stones.")
    };

    let details = scene_details(settings);
    if !details.is_empty() {
        prompt.push_str(&format!(" {}.", details.join(", ")));
    }
    let original = original.trim();
    if !original.is_empty() {
        prompt.push(' ');
        prompt.push_str(original);
    }
    prompt
}

//! Input preparation and answer normalization

use serde_json::{Map, Value};

use crate::protocol::{InputField, InputKind};
use crate::util::random_id;

/// Length of generated input ids
const INPUT_ID_LEN: usize = 16;

/// Attribute a checkbox answer is read from
pub const CHECKED_ATTRIBUTE: &str = "checked";

/// Attribute every other input's answer is read from
pub const VALUE_ATTRIBUTE: &str = "value";

/// Fill in everything the renderer needs before a form is shown
///
/// - unknown kinds become `error` inputs describing the problem
/// - missing ids are generated, missing keys fall back to the label
/// - plain inputs default to `text`
/// - only the first input asking for autofocus keeps it
/// - the value attribute is derived from the type when not given
pub fn prepare_inputs(inputs: &mut [InputField]) {
    let mut autofocus_claimed = false;

    for input in inputs.iter_mut() {
        if let InputKind::Other(kind) = &input.kind {
            input.details = Some(format!("Invalid input type provided: {}", kind));
            input.kind = InputKind::Error;
        }

        if input.id.is_none() {
            input.id = Some(random_id(INPUT_ID_LEN));
        }
        if input.key.is_none() {
            input.key = input.label.clone();
        }

        if input.kind == InputKind::Input && input.input_type.is_none() {
            input.input_type = Some("text".to_string());
        }

        input.autofocus = input.autofocus && !autofocus_claimed;
        autofocus_claimed |= input.autofocus;

        if input.value_attribute.is_none() {
            let is_checkbox = input.kind == InputKind::Checkbox || input.input_type.as_deref() == Some("checkbox");
            if is_checkbox {
                input.kind = InputKind::Checkbox;
                input.input_type = None;
                input.value_attribute = Some(CHECKED_ATTRIBUTE.to_string());
            } else {
                input.value_attribute = Some(VALUE_ATTRIBUTE.to_string());
            }
        }
    }
}

/// Collapse a single-answer form to its bare value unless told otherwise
pub fn normalize_answers(answers: Map<String, Value>, always_use_answer_object: bool) -> Value {
    if answers.len() == 1 && !always_use_answer_object {
        if let Some((_, value)) = answers.into_iter().next() {
            return value;
        }
        return Value::Null;
    }
    Value::Object(answers)
}

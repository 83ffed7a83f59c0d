use shopchat_agent::{ClassifierContext, IntentClassifier, LastSlots};
use shopchat_core::config::LoadOptions;

use crate::commands::{block_on, load_config, to_data, CommandResult};

pub fn run(options: &LoadOptions, text: &str) -> CommandResult {
    let config = match load_config("classify", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let classifier = IntentClassifier::from_config(&config.classifier);
    let result = match block_on("classify", async {
        classifier.classify(text, &ClassifierContext::default(), &LastSlots::default()).await
    }) {
        Ok(result) => result,
        Err(failure) => return failure,
    };

    CommandResult::success_with(
        "classify",
        format!("{} ({:.2}, {:?})", result.intent.as_str(), result.confidence, result.method),
        to_data(&result),
    )
}

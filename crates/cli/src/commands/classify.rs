//! `cadence classify-llm` — Classify an LLM backend failure.

use cadence_core::error::{LlmError, ProviderError};

pub fn run(message: &str, status: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let error = match status {
        Some(status_code) => ProviderError::ApiError {
            status_code,
            message: message.to_string(),
        },
        None => ProviderError::Other(message.to_string()),
    };

    let classified = LlmError::classify(error);
    println!("  Type:       {}", classified.kind.as_str());
    println!("  Retryable:  {}", classified.retryable);
    if let Some(code) = classified.status_code {
        println!("  Status:     {code}");
    }
    println!("  Message:    {}", classified.message);
    Ok(())
}

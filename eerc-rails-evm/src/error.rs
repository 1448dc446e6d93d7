use eerc_common::ExternalError;
use ethers::providers::MiddlewareError;

/// Map a provider or middleware error to the orchestrator's error shape.
///
/// The JSON-RPC error message (`"execution reverted: ..."`,
/// `"insufficient funds ..."`) becomes the short message; the full error
/// chain stays in `message`.
pub fn external_error<E: MiddlewareError>(err: E) -> ExternalError {
    let short_message = err
        .as_error_response()
        .map(|response| response.message.clone())
        .filter(|message| !message.trim().is_empty());
    ExternalError {
        short_message,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{HttpClientError, JsonRpcError, ProviderError};

    #[test]
    fn json_rpc_message_becomes_short_message() {
        let rpc = JsonRpcError {
            code: 3,
            message: "execution reverted: ERC20: insufficient allowance".to_string(),
            data: None,
        };
        let err = ProviderError::from(HttpClientError::JsonRpcError(rpc));
        let mapped = external_error(err);
        assert_eq!(
            mapped.user_message(),
            Some("execution reverted: ERC20: insufficient allowance")
        );
        assert!(!mapped.message.is_empty());
    }

    #[test]
    fn transport_errors_keep_full_message() {
        let err = ProviderError::CustomError("connection refused".to_string());
        let mapped = external_error(err);
        assert_eq!(mapped.short_message, None);
        assert_eq!(mapped.user_message(), Some("custom error: connection refused"));
    }
}

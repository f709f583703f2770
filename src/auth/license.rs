use crate::errors::BybitStreamsError;

/**
 * Trait gating manager construction on a validated license.
 *
 * The verifier is a construction-injected collaborator; the manager calls
 * `verify` once before starting any stream machinery and `release` during
 * shutdown.
 */
pub trait LicenseVerifier: Send + Sync + std::fmt::Debug {
    /**
     * Validates the configured license.
     *
     * # Returns
     * - `Ok(())` when the license is valid, `BybitStreamsError::MissingLicense`
     *   otherwise.
     */
    fn verify(&self, token: Option<&str>) -> Result<(), BybitStreamsError>;

    /**
     * Releases the license handle on manager shutdown.
     */
    fn release(&self) {}
}

/**
 * Default verifier: accepts any well-formed, non-empty token.
 */
#[derive(Debug, Default)]
pub struct TokenLicenseVerifier;

impl LicenseVerifier for TokenLicenseVerifier {
    fn verify(&self, token: Option<&str>) -> Result<(), BybitStreamsError> {
        match token {
            None => Err(BybitStreamsError::MissingLicense(
                "no license token configured".to_string(),
            )),
            Some(token) if token.trim().is_empty() => Err(BybitStreamsError::MissingLicense(
                "license token is empty".to_string(),
            )),
            Some(token) if token.contains(char::is_whitespace) => Err(
                BybitStreamsError::MissingLicense("license token is malformed".to_string()),
            ),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * Tests that the token verifier rejects missing and malformed tokens.
     */
    #[test]
    fn test_token_verifier() {
        // Arrange
        let verifier = TokenLicenseVerifier;

        // Act / Assert
        assert!(verifier.verify(Some("valid-token")).is_ok());
        assert!(verifier.verify(None).is_err());
        assert!(verifier.verify(Some("  ")).is_err());
        assert!(verifier.verify(Some("has space")).is_err());
    }
}

use crate::errors::AppError;

/// Number of digits in a valid CEP.
pub const CEP_LEN: usize = 8;

/// Keeps only the ASCII digits of `input`, in order.
pub fn digits_only(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalizes a free-form postal code ("01001-000", "01.001 000", ...) to its
/// 8 digits.
///
/// # Returns
///
/// * `Result<String, AppError>` - The 8 digit CEP, or `AppError::Validation`
///   when anything other than exactly 8 digits remains.
pub fn sanitize_cep(input: &str) -> Result<String, AppError> {
    let cep = digits_only(input);
    if cep.len() != CEP_LEN {
        return Err(AppError::Validation("invalid zipcode".to_string()));
    }
    Ok(cep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_ceps_are_accepted() {
        assert_eq!(sanitize_cep("01001-000").unwrap(), "01001000");
        assert_eq!(sanitize_cep("01001000").unwrap(), "01001000");
        assert_eq!(sanitize_cep(" 01.001 000 ").unwrap(), "01001000");
        assert_eq!(sanitize_cep("cep: 70040-010").unwrap(), "70040010");
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert!(matches!(sanitize_cep(""), Err(AppError::Validation(_))));
        assert!(matches!(sanitize_cep("0100100"), Err(AppError::Validation(_))));
        assert!(matches!(
            sanitize_cep("010010001"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(sanitize_cep("abcdefgh"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_non_ascii_digits_are_dropped() {
        // Arabic-Indic digits are not CEP digits
        assert!(sanitize_cep("٠١٠٠١٠٠٠").is_err());
        assert_eq!(digits_only("12٣45"), "1245");
    }
}

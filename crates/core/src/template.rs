//! `{{placeholder}}` substitution for policy message templates.

/// Placeholder for the recipient's full name.
pub const VAR_NAME: &str = "nombre";
/// Placeholder for the property address.
pub const VAR_PROPERTY: &str = "propiedad";
/// Placeholder for the outstanding amount.
pub const VAR_AMOUNT: &str = "monto";
/// Placeholder for the contract end date.
pub const VAR_DUE_DATE: &str = "fecha_vencimiento";
/// Placeholder for days left until the due date.
pub const VAR_DAYS_REMAINING: &str = "dias_restantes";
/// Placeholder for days elapsed since the due date.
pub const VAR_DAYS_OVERDUE: &str = "dias_vencido";
/// Placeholder for the contract number.
pub const VAR_CONTRACT_NUMBER: &str = "numero_contrato";

/// Replace every `{{key}}` occurrence in `template` with its value.
///
/// Placeholders without a matching variable are left untouched.
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_all_occurrences() {
        let out = render(
            "Hola {{nombre}}, {{nombre}} debe {{monto}}",
            &[(VAR_NAME, "Ana".to_string()), (VAR_AMOUNT, "1500".to_string())],
        );
        assert_eq!(out, "Hola Ana, Ana debe 1500");
    }

    #[test]
    fn unknown_placeholders_survive() {
        let out = render("{{desconocido}} {{nombre}}", &[(VAR_NAME, "Luis".to_string())]);
        assert_eq!(out, "{{desconocido}} Luis");
    }
}

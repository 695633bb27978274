/// Prompt construction for the flood-risk model.
///
/// The prompt is in Portuguese because the operators, the stored labels, and
/// the expected JSON keys (`nivel_risco`, `mensagem_alerta`, `recomendacao`)
/// all are.

use crate::model::{Aggregate, Location, RiskLevel};

/// Build the assessment request for one location.
pub fn build_prompt(location: &Location, aggregate: &Aggregate) -> String {
    let levels = RiskLevel::ALL
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "Atue como um Engenheiro de Defesa Civil.\n\
         Avalie o risco de enchente para {label}.\n\
         Contexto: altitude {altitude:.0} m, risco hidrológico base {baseline}.\n\
         Dados: acumulado das últimas 24h: {acc:.2} mm; previsão para as próximas 3h: {fc:.2} mm.\n\
         \n\
         Responda SOMENTE com um objeto JSON, sem texto adicional:\n\
         {{\n\
         \x20   \"nivel_risco\": \"{levels}\",\n\
         \x20   \"mensagem_alerta\": \"frase curta e impactante\",\n\
         \x20   \"recomendacao\": \"orientação direta\"\n\
         }}\n",
        label = location.label(),
        altitude = location.altitude,
        baseline = location.baseline_risk,
        acc = aggregate.accumulated_24h,
        fc = aggregate.forecast_3h,
        levels = levels,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blumenau() -> Location {
        Location {
            id: 4202404,
            name: "Blumenau".to_string(),
            region: "SC".to_string(),
            latitude: -26.9194,
            longitude: -49.0661,
            altitude: 21.0,
            timezone: "America/Sao_Paulo".to_string(),
            baseline_risk: 0.9,
        }
    }

    #[test]
    fn test_prompt_embeds_location_context_and_aggregates() {
        let prompt = build_prompt(
            &blumenau(),
            &Aggregate {
                accumulated_24h: 87.456,
                forecast_3h: 12.0,
            },
        );

        assert!(prompt.contains("Blumenau-SC"));
        assert!(prompt.contains("altitude 21 m"));
        assert!(prompt.contains("risco hidrológico base 0.9"));
        assert!(prompt.contains("87.46 mm"), "aggregates use two decimals");
        assert!(prompt.contains("12.00 mm"));
    }

    #[test]
    fn test_prompt_names_required_keys_and_levels() {
        let prompt = build_prompt(
            &blumenau(),
            &Aggregate {
                accumulated_24h: 0.0,
                forecast_3h: 0.0,
            },
        );

        for key in ["\"nivel_risco\"", "\"mensagem_alerta\"", "\"recomendacao\""] {
            assert!(prompt.contains(key), "prompt should name {}", key);
        }
        assert!(prompt.contains("Baixo/Moderado/Alto/Crítico"));
        assert!(prompt.contains("SOMENTE com um objeto JSON"));
    }
}

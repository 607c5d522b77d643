use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solar_nexus::{Component, Context};

const CALCULATOR_KEY: &str = "calculator";

/// Persisted calculator inputs. The savings arithmetic itself lives in the
/// front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalculatorState {
    pub visits: u32,
    pub monthly_bill: Option<f64>,
}

#[derive(Default)]
pub struct CalculatorPage;

#[async_trait]
impl Component for CalculatorPage {
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let mut saved: CalculatorState = cx.state().get_as(CALCULATOR_KEY).unwrap_or_default();
        saved.visits += 1;
        cx.state().set(CALCULATOR_KEY, serde_json::to_value(&saved)?);

        let root = cx.element();
        root.append("h1", "Solar savings calculator");
        match saved.monthly_bill {
            Some(bill) => root.append("p", format!("Last estimate used a £{bill:.0} monthly bill.")),
            None => root.append("p", "Enter your monthly bill to estimate your savings."),
        };
        root.append("small", format!("Visit {}", saved.visits));
        Ok(())
    }
}

use std::collections::HashMap;

use crate::database::enums::{DataType, SymbolScope};
use crate::error::FetchError;
use crate::models::{Instrument, RegistryEntry};

/// Substitution values for one fetch
pub type EndpointParams = HashMap<&'static str, String>;

/// Collect the placeholder values available for an entry and instrument
pub fn params_for(
    entry: &RegistryEntry,
    instrument: &Instrument,
    api_key: &str,
) -> Result<EndpointParams, FetchError> {
    let mut params = EndpointParams::new();
    params.insert("apikey", api_key.to_string());
    params.insert("symbol", instrument.code.clone());

    if let Some(function) = entry.api_function.as_deref().map(str::trim) {
        if !function.is_empty() {
            params.insert("function", function.to_uppercase());
        }
    }

    match entry.data_type.symbol_scope() {
        SymbolScope::CurrencyPairs => {
            if let (Some(base), Some(quote)) = (&instrument.base, &instrument.quote) {
                params.insert("from_symbol", base.clone());
                params.insert("to_symbol", quote.clone());
            }
        }
        SymbolScope::Currencies => {
            params.insert("ticker", instrument.code.clone());
            params.insert("tickers", instrument.code.clone());
        }
        SymbolScope::SingleSeries => {}
    }

    if entry.data_type == DataType::TechnicalIndicator {
        let indicator = entry
            .indicator_params()
            .map_err(|e| FetchError::Permanent(e.to_string()))?;
        params.insert("interval", indicator.interval);
        params.insert("time_period", indicator.time_period.to_string());
        params.insert("series_type", indicator.series_type);
    } else if let Some(interval) = entry.api_interval.as_deref().map(str::trim) {
        if !interval.is_empty() {
            params.insert("interval", interval.to_string());
        }
    }

    Ok(params)
}

/// Replace every `{name}` in the template
///
/// A placeholder without a value or an unbalanced brace is a permanent error.
pub fn render(template: &str, params: &EndpointParams) -> Result<String, FetchError> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let close = after.find('}').ok_or_else(|| {
            FetchError::Permanent(format!("unbalanced '{{' in endpoint template at {}", open))
        })?;
        let name = &after[..close];

        let value = params.get(name).ok_or_else(|| {
            FetchError::Permanent(format!("unresolved placeholder {{{}}} in endpoint template", name))
        })?;
        out.push_str(value);

        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Mask the API key in a URL before it is logged
pub fn redact(url: &str, api_key: &str) -> String {
    let masked = if api_key.is_empty() {
        url.to_string()
    } else {
        url.replace(api_key, "***")
    };

    // Key may also be hard-coded in the template
    match masked.find("apikey=") {
        Some(pos) => {
            let start = pos + "apikey=".len();
            let end = masked[start..]
                .find('&')
                .map(|i| start + i)
                .unwrap_or(masked.len());
            format!("{}***{}", &masked[..start], &masked[end..])
        }
        None => masked,
    }
}

//! Normalises forecast payloads into [`Observations`].
//!
//! Both wire formats are first reduced to a list of flat `field -> text` items, then a
//! single conversion step turns items into observations. This keeps JSON and XML
//! responses with the same content producing identical results.

use crate::types::observation::{GridCell, Observations, WeatherObservation};
use crate::types::weather_category::WeatherCategory;
use crate::utils::parse_provider_timestamp;
use crate::weather::error::FetchError;
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Success code in the response header.
const RESULT_OK: &str = "00";
/// "NO_DATA" code, treated as an empty payload rather than a malformed one.
const RESULT_NO_DATA: &str = "03";
/// Values at or beyond this magnitude are provider placeholders for "missing".
const MISSING_SENTINEL: f64 = 900.0;

/// Wire format of a forecast response. Also the value of the `dataType` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    #[default]
    Json,
    Xml,
}

impl PayloadFormat {
    pub fn query_value(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "JSON",
            PayloadFormat::Xml => "XML",
        }
    }

    /// Picks the format from a `Content-Type` header, falling back to the first
    /// non-whitespace byte of the body.
    pub fn detect(content_type: Option<&str>, body: &str) -> Option<Self> {
        if let Some(content_type) = content_type.map(str::to_ascii_lowercase) {
            if content_type.contains("json") {
                return Some(PayloadFormat::Json);
            }
            if content_type.contains("xml") {
                return Some(PayloadFormat::Xml);
            }
        }
        match body.trim_start().chars().next() {
            Some('{') | Some('[') => Some(PayloadFormat::Json),
            Some('<') => Some(PayloadFormat::Xml),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_value())
    }
}

type FlatItem = BTreeMap<String, String>;

/// Parses a response body of a known format into observations.
///
/// `grid` is used for items that do not carry their own `nx`/`ny`.
pub fn parse_payload(
    format: PayloadFormat,
    body: &str,
    grid: GridCell,
) -> Result<Observations, FetchError> {
    let items = match format {
        PayloadFormat::Json => json_items(body)?,
        PayloadFormat::Xml => xml_items(body)?,
    };
    debug!("Decoded {} {} forecast items", items.len(), format);
    normalize(format, &items, grid)
}

fn check_result_code(
    format: PayloadFormat,
    code: Option<&str>,
    message: Option<&str>,
) -> Result<(), FetchError> {
    match code.map(str::trim) {
        None | Some(RESULT_OK) => Ok(()),
        Some(RESULT_NO_DATA) => Err(FetchError::EmptyPayload),
        Some(code) => Err(FetchError::parse(
            format,
            format!(
                "provider returned result code {code}: {}",
                message.unwrap_or("no message")
            ),
        )),
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_items(body: &str) -> Result<Vec<FlatItem>, FetchError> {
    let format = PayloadFormat::Json;
    let root: Value =
        serde_json::from_str(body).map_err(|e| FetchError::parse(format, e.to_string()))?;
    let response = root
        .get("response")
        .ok_or_else(|| FetchError::parse(format, "missing 'response' object"))?;

    if let Some(header) = response.get("header") {
        let code = header.get("resultCode").and_then(json_scalar);
        let message = header.get("resultMsg").and_then(json_scalar);
        check_result_code(format, code.as_deref(), message.as_deref())?;
    }

    let body = response
        .get("body")
        .ok_or_else(|| FetchError::parse(format, "missing 'response.body' object"))?;
    let items = match body.get("items") {
        None | Some(Value::Null) => return Err(FetchError::EmptyPayload),
        // The portal serialises an empty result as `"items": ""`.
        Some(Value::String(s)) if s.trim().is_empty() => return Err(FetchError::EmptyPayload),
        Some(items) => items,
    };
    let raw_items = match items.get("item") {
        None | Some(Value::Null) => return Err(FetchError::EmptyPayload),
        Some(Value::Array(list)) => list.iter().collect::<Vec<_>>(),
        Some(single @ Value::Object(_)) => vec![single],
        Some(_) => return Err(FetchError::parse(format, "'item' is neither a list nor an object")),
    };

    raw_items
        .into_iter()
        .enumerate()
        .map(|(index, raw)| -> Result<FlatItem, FetchError> {
            let object = raw
                .as_object()
                .ok_or_else(|| FetchError::parse(format, format!("item {index} is not an object")))?;
            let mut item = FlatItem::new();
            for (key, value) in object {
                if value.is_null() {
                    continue;
                }
                let text = json_scalar(value).ok_or_else(|| {
                    FetchError::parse(format, format!("item {index} field '{key}' is not a scalar"))
                })?;
                item.insert(key.clone(), text);
            }
            Ok(item)
        })
        .collect()
}

fn xml_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn xml_attributes(element: &BytesStart<'_>) -> Result<FlatItem, FetchError> {
    let mut item = FlatItem::new();
    for attribute in element.attributes() {
        let attribute = attribute
            .map_err(|e| FetchError::parse(PayloadFormat::Xml, format!("bad attribute: {e}")))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| FetchError::parse(PayloadFormat::Xml, e.to_string()))?;
        item.insert(
            xml_name(attribute.key.local_name().as_ref()),
            value.into_owned(),
        );
    }
    Ok(item)
}

/// Header fields read outside of `<item>` elements.
#[derive(Default)]
struct XmlEnvelope {
    saw_response: bool,
    code: Option<String>,
    message: Option<String>,
}

impl XmlEnvelope {
    fn record(&mut self, element: &str, text: String) {
        match element {
            "resultCode" | "returnReasonCode" => self.code = Some(text),
            "resultMsg" | "returnAuthMsg" | "errMsg" => {
                self.message.get_or_insert(text);
            }
            _ => {}
        }
    }
}

/// State of the `<item>` currently being read.
struct OpenItem {
    fields: FlatItem,
    depth: usize,
    field: Option<String>,
}

fn xml_items(body: &str) -> Result<Vec<FlatItem>, FetchError> {
    let format = PayloadFormat::Xml;
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut envelope = XmlEnvelope::default();
    let mut open: Option<OpenItem> = None;
    let mut outer_element: Option<String> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            FetchError::parse(
                format,
                format!("malformed XML at byte {}: {e}", reader.buffer_position()),
            )
        })?;
        let text = match event {
            Event::Start(e) => {
                let name = xml_name(e.local_name().as_ref());
                match open.as_mut() {
                    Some(item) => {
                        item.depth += 1;
                        if item.depth == 1 {
                            item.field = Some(name);
                        }
                    }
                    None if name == "item" => {
                        open = Some(OpenItem {
                            fields: xml_attributes(&e)?,
                            depth: 0,
                            field: None,
                        });
                    }
                    None => {
                        if matches!(name.as_str(), "response" | "OpenAPI_ServiceResponse") {
                            envelope.saw_response = true;
                        }
                        outer_element = Some(name);
                    }
                }
                None
            }
            Event::Empty(e) => {
                let name = xml_name(e.local_name().as_ref());
                match open.as_mut() {
                    Some(item) if item.depth == 0 => {
                        item.fields.entry(name).or_default();
                    }
                    Some(_) => {}
                    None if name == "item" => items.push(xml_attributes(&e)?),
                    None => {}
                }
                None
            }
            Event::Text(t) => Some(
                t.unescape()
                    .map_err(|e| FetchError::parse(format, e.to_string()))?
                    .into_owned(),
            ),
            Event::CData(c) => Some(String::from_utf8_lossy(&c.into_inner()).into_owned()),
            Event::End(_) => {
                let closes_item = open.as_ref().is_some_and(|item| item.depth == 0);
                if closes_item {
                    if let Some(item) = open.take() {
                        items.push(item.fields);
                    }
                } else if let Some(item) = open.as_mut() {
                    if item.depth == 1 {
                        item.field = None;
                    }
                    item.depth -= 1;
                } else {
                    outer_element = None;
                }
                None
            }
            Event::Eof => break,
            _ => None,
        };

        if let Some(text) = text {
            match open.as_mut() {
                Some(item) if item.depth == 1 => {
                    if let Some(field) = item.field.clone() {
                        item.fields.entry(field).or_default().push_str(&text);
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(element) = outer_element.as_deref() {
                        envelope.record(element, text);
                    }
                }
            }
        }
    }

    if open.is_some() {
        return Err(FetchError::parse(format, "document ended inside an <item>"));
    }
    check_result_code(format, envelope.code.as_deref(), envelope.message.as_deref())?;
    if items.is_empty() && !envelope.saw_response {
        return Err(FetchError::parse(
            format,
            "document has neither a <response> envelope nor <item> elements",
        ));
    }
    Ok(items)
}

/// Decodes a value of `category`. `Ok(None)` means the provider marked it as missing.
fn parse_value(category: WeatherCategory, raw: &str) -> Result<Option<f64>, String> {
    let raw = raw.trim();
    let parsed = if category.is_precipitation_amount() {
        parse_precipitation(raw)
    } else {
        raw.parse::<f64>().ok()
    };
    let value = parsed.ok_or_else(|| format!("unparsable {category} value '{raw}'"))?;

    if !value.is_finite() {
        return Err(format!("non-finite {category} value '{raw}'"));
    }
    if value.abs() >= MISSING_SENTINEL {
        return Ok(None);
    }
    Ok(Some(value))
}

/// Precipitation and snowfall are published as text buckets in the village forecast:
/// `강수없음` / `적설없음` (none), `1mm 미만` (below), `30.0~50.0mm` (range) and
/// `50.0mm 이상` (at least). Plain numbers appear in the ultra-short services.
fn parse_precipitation(raw: &str) -> Option<f64> {
    if raw.is_empty() || raw == "-" || raw.contains("없음") {
        return Some(0.0);
    }
    let number = |s: &str| -> Option<f64> {
        s.trim()
            .trim_end_matches("mm")
            .trim_end_matches("cm")
            .trim()
            .parse::<f64>()
            .ok()
    };
    if let Some(limit) = raw.strip_suffix("미만") {
        return number(limit).map(|v| v / 2.0);
    }
    if let Some(floor) = raw.strip_suffix("이상") {
        return number(floor);
    }
    if let Some((low, _)) = raw.split_once('~') {
        return number(low);
    }
    number(raw)
}

fn field<'a>(item: &'a FlatItem, name: &str) -> Option<&'a str> {
    item.get(name).map(String::as_str)
}

fn item_grid(item: &FlatItem, fallback: GridCell) -> GridCell {
    let coordinate = |name: &str| field(item, name).and_then(|v| v.trim().parse::<u16>().ok());
    match (coordinate("nx"), coordinate("ny")) {
        (Some(x), Some(y)) => GridCell::new(x, y),
        _ => fallback,
    }
}

fn item_observation(
    format: PayloadFormat,
    index: usize,
    item: &FlatItem,
    grid: GridCell,
) -> Result<Option<WeatherObservation>, FetchError> {
    let missing = |name: &str| FetchError::parse(format, format!("item {index} has no '{name}'"));

    let code = field(item, "category").ok_or_else(|| missing("category"))?;
    let Some(category) = WeatherCategory::from_code(code) else {
        warn!("Skipping forecast item {index} with unknown category '{code}'");
        return Ok(None);
    };

    // Forecast items carry fcst*, observation items carry base* + obsrValue.
    let (date, time, raw_value) = if let Some(value) = field(item, "fcstValue") {
        (
            field(item, "fcstDate").ok_or_else(|| missing("fcstDate"))?,
            field(item, "fcstTime").ok_or_else(|| missing("fcstTime"))?,
            value,
        )
    } else if let Some(value) = field(item, "obsrValue") {
        (
            field(item, "baseDate").ok_or_else(|| missing("baseDate"))?,
            field(item, "baseTime").ok_or_else(|| missing("baseTime"))?,
            value,
        )
    } else {
        return Err(missing("fcstValue"));
    };

    let timestamp = parse_provider_timestamp(date, time).ok_or_else(|| {
        FetchError::parse(
            format,
            format!("item {index} has an invalid date/time '{date}' '{time}'"),
        )
    })?;
    let Some(value) =
        parse_value(category, raw_value).map_err(|message| FetchError::parse(format, message))?
    else {
        debug!("Skipping missing {category} value at {timestamp}");
        return Ok(None);
    };

    Ok(Some(WeatherObservation {
        timestamp,
        category,
        value,
        grid: item_grid(item, grid),
    }))
}

fn normalize(
    format: PayloadFormat,
    items: &[FlatItem],
    grid: GridCell,
) -> Result<Observations, FetchError> {
    let mut observations = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if let Some(observation) = item_observation(format, index, item, grid)? {
            observations.push(observation);
        }
    }
    Observations::new(observations).ok_or(FetchError::EmptyPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use chrono::NaiveDate;

    const GRID: GridCell = GridCell { x: 60, y: 127 };

    fn json_body(items: &str) -> String {
        format!(
            r#"{{"response":{{"header":{{"resultCode":"00","resultMsg":"NORMAL_SERVICE"}},
               "body":{{"dataType":"JSON","items":{{"item":{items}}},"pageNo":1,"numOfRows":10,"totalCount":3}}}}}}"#
        )
    }

    const JSON_ITEMS: &str = r#"[
        {"baseDate":"20240701","baseTime":"0500","category":"TMP","fcstDate":"20240701","fcstTime":"0600","fcstValue":"22","nx":60,"ny":127},
        {"baseDate":"20240701","baseTime":"0500","category":"PCP","fcstDate":"20240701","fcstTime":"0600","fcstValue":"1mm 미만","nx":60,"ny":127},
        {"baseDate":"20240701","baseTime":"0500","category":"WSD","fcstDate":"20240701","fcstTime":"0700","fcstValue":"3.4","nx":60,"ny":127}
    ]"#;

    const XML_CHILDREN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <response>
          <header><resultCode>00</resultCode><resultMsg>NORMAL_SERVICE</resultMsg></header>
          <body><dataType>XML</dataType><items>
            <item><baseDate>20240701</baseDate><baseTime>0500</baseTime><category>TMP</category>
                  <fcstDate>20240701</fcstDate><fcstTime>0600</fcstTime><fcstValue>22</fcstValue><nx>60</nx><ny>127</ny></item>
            <item><baseDate>20240701</baseDate><baseTime>0500</baseTime><category>PCP</category>
                  <fcstDate>20240701</fcstDate><fcstTime>0600</fcstTime><fcstValue><![CDATA[1mm 미만]]></fcstValue><nx>60</nx><ny>127</ny></item>
            <item><baseDate>20240701</baseDate><baseTime>0500</baseTime><category>WSD</category>
                  <fcstDate>20240701</fcstDate><fcstTime>0700</fcstTime><fcstValue>3.4</fcstValue><nx>60</nx><ny>127</ny></item>
          </items><pageNo>1</pageNo><numOfRows>10</numOfRows><totalCount>3</totalCount></body>
        </response>"#;

    const XML_ATTRIBUTES: &str = r#"<response><body><items>
        <item baseDate="20240701" baseTime="0500" category="TMP" fcstDate="20240701" fcstTime="0600" fcstValue="22" nx="60" ny="127"/>
        <item baseDate="20240701" baseTime="0500" category="PCP" fcstDate="20240701" fcstTime="0600" fcstValue="1mm 미만" nx="60" ny="127"/>
        <item baseDate="20240701" baseTime="0500" category="WSD" fcstDate="20240701" fcstTime="0700" fcstValue="3.4" nx="60" ny="127"></item>
        </items></body></response>"#;

    #[test]
    fn test_json_and_xml_payloads_agree() -> Result<(), FetchError> {
        let from_json = parse_payload(PayloadFormat::Json, &json_body(JSON_ITEMS), GRID)?;
        let from_children = parse_payload(PayloadFormat::Xml, XML_CHILDREN, GRID)?;
        let from_attributes = parse_payload(PayloadFormat::Xml, XML_ATTRIBUTES, GRID)?;

        assert_eq!(from_json.len(), 3);
        assert_eq!(from_json, from_children);
        assert_eq!(from_json, from_attributes);

        let first = &from_json.as_slice()[0];
        assert_eq!(
            first.timestamp,
            NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap()
        );
        assert_eq!(first.category, WeatherCategory::Temperature);
        assert_eq!(first.value, 22.0);
        assert_eq!(from_json.as_slice()[1].value, 0.5);
        Ok(())
    }

    #[test]
    fn test_single_object_item() -> Result<(), FetchError> {
        let body = json_body(
            r#"{"category":"T1H","fcstDate":"20240701","fcstTime":"600","fcstValue":18.5}"#,
        );
        let observations = parse_payload(PayloadFormat::Json, &body, GRID)?;
        assert_eq!(observations.len(), 1);
        assert_eq!(observations.as_slice()[0].value, 18.5);
        assert_eq!(observations.as_slice()[0].grid, GRID);
        Ok(())
    }

    #[test]
    fn test_empty_payloads() {
        let empty_list = json_body("[]");
        let empty_string = r#"{"response":{"header":{"resultCode":"00"},"body":{"items":""}}}"#;
        let no_data = r#"{"response":{"header":{"resultCode":"03","resultMsg":"NO_DATA"}}}"#;
        let empty_xml = "<response><header><resultCode>00</resultCode></header><body><items/></body></response>";

        for (format, body) in [
            (PayloadFormat::Json, empty_list.as_str()),
            (PayloadFormat::Json, empty_string),
            (PayloadFormat::Json, no_data),
            (PayloadFormat::Xml, empty_xml),
        ] {
            let err = parse_payload(format, body, GRID).unwrap_err();
            assert_eq!(err.kind(), FailureKind::EmptyPayload, "{body}");
        }
    }

    #[test]
    fn test_error_envelopes_are_parse_errors() {
        let json_error =
            r#"{"response":{"header":{"resultCode":"30","resultMsg":"SERVICE_KEY_IS_NOT_REGISTERED_ERROR"}}}"#;
        let xml_error = r#"<OpenAPI_ServiceResponse><cmmMsgHeader>
            <errMsg>SERVICE ERROR</errMsg><returnAuthMsg>SERVICE_KEY_IS_NOT_REGISTERED_ERROR</returnAuthMsg>
            <returnReasonCode>30</returnReasonCode></cmmMsgHeader></OpenAPI_ServiceResponse>"#;

        let err = parse_payload(PayloadFormat::Json, json_error, GRID).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseError);
        assert!(err.to_string().contains("SERVICE_KEY_IS_NOT_REGISTERED_ERROR"));

        let err = parse_payload(PayloadFormat::Xml, xml_error, GRID).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseError);
        assert!(err.to_string().contains("result code 30"));
    }

    #[test]
    fn test_malformed_payloads_are_parse_errors() {
        let missing_field = json_body(r#"[{"category":"TMP","fcstDate":"20240701"}]"#);
        let bad_value = json_body(
            r#"[{"category":"TMP","fcstDate":"20240701","fcstTime":"0600","fcstValue":"warm"}]"#,
        );
        for (format, body) in [
            (PayloadFormat::Json, "{not json"),
            (PayloadFormat::Json, r#"{"header":{}}"#),
            (PayloadFormat::Json, missing_field.as_str()),
            (PayloadFormat::Json, bad_value.as_str()),
            (PayloadFormat::Xml, "<response><body><items><item><category>TMP</category>"),
            (PayloadFormat::Xml, "<html><body>Bad gateway</body></html>"),
        ] {
            let err = parse_payload(format, body, GRID).unwrap_err();
            assert_eq!(err.kind(), FailureKind::ParseError, "{body}");
        }
    }

    #[test]
    fn test_unknown_categories_and_sentinels_are_skipped() -> Result<(), FetchError> {
        let body = json_body(
            r#"[
            {"category":"ZZZ","fcstDate":"20240701","fcstTime":"0600","fcstValue":"1"},
            {"category":"WSD","fcstDate":"20240701","fcstTime":"0600","fcstValue":"-999"},
            {"category":"REH","fcstDate":"20240701","fcstTime":"0600","fcstValue":"80"}
        ]"#,
        );
        let observations = parse_payload(PayloadFormat::Json, &body, GRID)?;
        assert_eq!(observations.len(), 1);
        assert_eq!(observations.as_slice()[0].category, WeatherCategory::Humidity);

        let only_skipped = json_body(
            r#"[{"category":"ZZZ","fcstDate":"20240701","fcstTime":"0600","fcstValue":"1"}]"#,
        );
        let err = parse_payload(PayloadFormat::Json, &only_skipped, GRID).unwrap_err();
        assert_eq!(err.kind(), FailureKind::EmptyPayload);
        Ok(())
    }

    #[test]
    fn test_observation_items() -> Result<(), FetchError> {
        let body = json_body(
            r#"[{"baseDate":"20240701","baseTime":"0600","category":"RN1","nx":61,"ny":126,"obsrValue":"6.5"}]"#,
        );
        let observations = parse_payload(PayloadFormat::Json, &body, GRID)?;
        let observation = &observations.as_slice()[0];
        assert_eq!(observation.category, WeatherCategory::Rainfall);
        assert_eq!(observation.value, 6.5);
        assert_eq!(observation.grid, GridCell::new(61, 126));
        Ok(())
    }

    #[test]
    fn test_precipitation_buckets() {
        assert_eq!(parse_precipitation("강수없음"), Some(0.0));
        assert_eq!(parse_precipitation("적설없음"), Some(0.0));
        assert_eq!(parse_precipitation("1mm 미만"), Some(0.5));
        assert_eq!(parse_precipitation("1.0mm 미만"), Some(0.5));
        assert_eq!(parse_precipitation("30.0~50.0mm"), Some(30.0));
        assert_eq!(parse_precipitation("50.0mm 이상"), Some(50.0));
        assert_eq!(parse_precipitation("6.2mm"), Some(6.2));
        assert_eq!(parse_precipitation("0"), Some(0.0));
        assert_eq!(parse_precipitation("heavy"), None);
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            PayloadFormat::detect(Some("application/json;charset=UTF-8"), "<x/>"),
            Some(PayloadFormat::Json)
        );
        assert_eq!(
            PayloadFormat::detect(Some("text/xml"), "{}"),
            Some(PayloadFormat::Xml)
        );
        assert_eq!(
            PayloadFormat::detect(Some("text/plain"), "  \n{\"a\":1}"),
            Some(PayloadFormat::Json)
        );
        assert_eq!(
            PayloadFormat::detect(None, "<response/>"),
            Some(PayloadFormat::Xml)
        );
        assert_eq!(PayloadFormat::detect(None, "SERVICE ERROR"), None);
    }
}

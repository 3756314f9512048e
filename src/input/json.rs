//! JSON configuration files.

use std::convert::TryFrom;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value as JSONValue;
use tracing::warn;

use crate::channel::{ChannelDefinition, Mode};

use super::{Config, ConfigReader, Result, DEFAULT_INFO_VAR};
use super::error::Error;

/** Reads a converter configuration from a JSON file.

The document names the bus device, the converter's address (hexadecimal),
and the channels to sample:

```text
{
    "device" : "/dev/i2c-1",
    "address" : "4b",
    "channels" : [
        { "channel" : "0", "var" : "/HW/ADS7830/A0", "mode" : "calc" },
        { "channel" : "3", "var" : "/HW/ADS7830/A3", "mode" : "timer", "interval" : "1000" }
    ]
}
```
 */
#[derive(Debug)]
pub struct JSONConfigParser {
    config_path: PathBuf,
}

impl JSONConfigParser {
    /// Create a parser for the file at `config_path`.
    pub fn new(config_path: &Path) -> JSONConfigParser {
        JSONConfigParser {
            config_path: config_path.to_path_buf(),
        }
    }
}

impl ConfigReader for JSONConfigParser {
    fn read(&self) -> Result<Config> {
        let mut text = String::new();
        let mut file = File::open(self.config_path.as_path())?;
        file.read_to_string(&mut text)?;

        parse_config(self.config_path.as_path(), &text)
    }
}

/// Parse a configuration document read from `source`.
pub fn parse_config(source: &Path, text: &str) -> Result<Config> {
    let json: JSONValue = serde_json::from_str(text)?;

    let device = json["device"].as_str()
        .ok_or(Error::Missing("device"))?
        .to_string();
    let address = parse_address(&json["address"])?;

    let info_var = match json["info"] {
        JSONValue::Null => DEFAULT_INFO_VAR.to_string(),
        JSONValue::String(ref name) => name.clone(),
        _ => return Err(Error::Format("'info' must be a variable name".to_string())),
    };

    let entries = match json["channels"] {
        JSONValue::Array(ref entries) => entries.as_slice(),
        JSONValue::Null => return Err(Error::Missing("channels")),
        _ => return Err(Error::Format("'channels' must be an array".to_string())),
    };

    // A bad entry only costs that channel.
    let mut channels = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        match parse_channel(entry) {
            Ok(def) => channels.push(def),
            Err(e) => warn!("skipping channel entry {}: {}", i, e),
        }
    }

    let document = serde_json::to_string_pretty(&json)?;

    Ok(Config {
        source: source.to_path_buf(),
        device,
        address,
        info_var,
        channels,
        document,
    })
}

/// Parse a 7-bit bus address given as hexadecimal text or a number.
fn parse_address(value: &JSONValue) -> Result<u8> {
    let address = match value {
        JSONValue::String(ref text) => {
            let digits = text.trim();
            let digits = digits.strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0X"))
                .unwrap_or(digits);
            u8::from_str_radix(digits, 16)
                .map_err(|_e| Error::Format(format!("address '{}' is not hexadecimal", text)))?
        },
        JSONValue::Number(ref n) => n.as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| Error::Format(format!("address {} is out of range", n)))?,
        JSONValue::Null => return Err(Error::Missing("address")),
        _ => return Err(Error::Format("'address' must be a hexadecimal string".to_string())),
    };

    if address > 0x7f {
        Err(Error::Format(format!("address 0x{:02x} is not a 7-bit address", address)))
    } else {
        Ok(address)
    }
}

#[derive(Deserialize)]
struct ChannelEntry {
    #[serde(alias = "line")]
    channel: Option<JSONValue>,
    var: Option<String>,
    mode: Option<String>,
    interval: Option<JSONValue>,
}

fn parse_channel(value: &JSONValue) -> Result<ChannelDefinition> {
    let entry: ChannelEntry = serde_json::from_value(value.clone())
        .map_err(|e| Error::Format(format!("channel entry: {}", e)))?;

    let index = entry.channel.as_ref()
        .ok_or(Error::Missing("channel"))
        .and_then(|v| as_integer(v)
                  .ok_or_else(|| Error::Format(format!("channel index {} is not a number", v))))?;

    let mode = entry.mode.as_deref()
        .map(Mode::try_from)
        .transpose()
        .map_err(Error::Format)?;

    let interval_ms = match entry.interval {
        Some(ref v) => {
            let ms = as_integer(v)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| Error::Format(format!("interval {} is not a valid duration", v)))?;
            Some(ms)
        },
        None => None,
    };

    Ok(ChannelDefinition {
        index,
        var: entry.var,
        mode,
        interval_ms,
    })
}

/// Accept numbers written either as JSON numbers or decimal strings.
fn as_integer(value: &JSONValue) -> Option<i64> {
    match value {
        JSONValue::Number(ref n) => n.as_i64(),
        JSONValue::String(ref s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "device" : "/dev/i2c-1",
        "address" : "4b",
        "channels" : [
            { "channel" : "0", "var" : "/HW/ADS7830/A0", "mode" : "calc" },
            { "channel" : "1", "var" : "/HW/ADS7830/A1", "mode" : "timer", "interval" : "100" },
            { "line" : 3, "var" : "/HW/ADS7830/A3", "mode" : "timer", "interval" : 1000 }
        ]
    }"#;

    fn parse(text: &str) -> Result<Config> {
        parse_config(Path::new("/etc/ads7830.json"), text)
    }

    #[test]
    fn sample_configuration() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.source, PathBuf::from("/etc/ads7830.json"));
        assert_eq!(config.device, "/dev/i2c-1");
        assert_eq!(config.address, 0x4b);
        assert_eq!(config.info_var, DEFAULT_INFO_VAR);
        assert_eq!(config.channels, vec![
            ChannelDefinition {
                index: 0,
                var: Some("/HW/ADS7830/A0".to_string()),
                mode: Some(Mode::Calc),
                interval_ms: None,
            },
            ChannelDefinition {
                index: 1,
                var: Some("/HW/ADS7830/A1".to_string()),
                mode: Some(Mode::Timer),
                interval_ms: Some(100),
            },
            ChannelDefinition {
                index: 3,
                var: Some("/HW/ADS7830/A3".to_string()),
                mode: Some(Mode::Timer),
                interval_ms: Some(1000),
            },
        ]);
        assert!(config.document.contains("/HW/ADS7830/A3"));
    }

    #[test]
    fn address_forms() {
        assert_eq!(parse_address(&JSONValue::from("48")).unwrap(), 0x48);
        assert_eq!(parse_address(&JSONValue::from("0x4B")).unwrap(), 0x4b);
        assert_eq!(parse_address(&JSONValue::from(75)).unwrap(), 0x4b);
        assert!(parse_address(&JSONValue::from("zz")).is_err());
        assert!(parse_address(&JSONValue::from("80")).is_err());
        assert!(matches!(parse_address(&JSONValue::Null), Err(Error::Missing("address"))));
    }

    #[test]
    fn missing_required_settings() {
        assert!(matches!(parse(r#"{ "address": "4b", "channels": [] }"#),
                         Err(Error::Missing("device"))));
        assert!(matches!(parse(r#"{ "device": "/dev/i2c-1", "channels": [] }"#),
                         Err(Error::Missing("address"))));
        assert!(matches!(parse(r#"{ "device": "/dev/i2c-1", "address": "4b" }"#),
                         Err(Error::Missing("channels"))));
        assert!(matches!(parse("{ not json"), Err(Error::JSON(_))));
    }

    #[test]
    fn bad_entries_are_skipped() {
        let config = parse(r#"{
            "device" : "/dev/i2c-1",
            "address" : "4b",
            "channels" : [
                { "var" : "/HW/ADS7830/A0" },
                { "channel" : "two", "var" : "/HW/ADS7830/A2" },
                { "channel" : "4", "var" : "/HW/ADS7830/A4", "interval" : "-5" },
                { "channel" : "5", "var" : "/HW/ADS7830/A5", "mode" : "poll" },
                "not an object",
                { "channel" : "9", "var" : "/HW/ADS7830/A9" },
                { "channel" : "6", "var" : "/HW/ADS7830/A6" }
            ]
        }"#).unwrap();

        // Range checking is left to the channel table.
        let indices: Vec<i64> = config.channels.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![9, 6]);
    }

    #[test]
    fn custom_info_variable() {
        let config = parse(r#"{
            "device" : "/dev/i2c-0",
            "address" : "0x48",
            "info" : "/HW/ADC/STATUS",
            "channels" : []
        }"#).unwrap();
        assert_eq!(config.info_var, "/HW/ADC/STATUS");
        assert!(config.channels.is_empty());
    }
}

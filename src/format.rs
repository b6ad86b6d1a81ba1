//! Reading and writing `monitors.xml`.
//!
//! Version 1 files wrap every `<configuration>` in a `<monitors version="1">`
//! element. Older files list bare `<configuration>` elements at the top
//! level; those are still read but never written.

use log::{debug, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::monitor::{OutputInfo, Rotation};

pub const FORMAT_VERSION: i64 = 1;

/// Name given to an `<output>` that arrives without one.
const PLACEHOLDER_OUTPUT_NAME: &str = "default";

type XmlReader<'a> = Reader<&'a [u8]>;

fn malformed(reader: &XmlReader<'_>, err: quick_xml::Error) -> Error {
    Error::MalformedPersistedFile(format!("{err} (at byte {})", reader.buffer_position()))
}

fn next_event<'a>(reader: &mut XmlReader<'a>) -> Result<Event<'a>> {
    reader.read_event().map_err(|e| malformed(reader, e))
}

fn unexpected_eof(element: &str) -> Error {
    Error::MalformedPersistedFile(format!("unexpected end of file inside <{element}>"))
}

/// Parses every configuration stored in `text`.
pub fn parse(text: &str) -> Result<Vec<Configuration>> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    let mut configurations = Vec::new();

    loop {
        match next_event(&mut reader)? {
            Event::Start(start) => match start.name().as_ref() {
                b"monitors" => {
                    let version = attribute(&reader, &start, "version")?
                        .map(|v| parse_int(&v))
                        .unwrap_or(0);
                    debug!("monitors file version {version}");
                    parse_monitors(&mut reader, &mut configurations)?;
                }
                // Version 0: configurations directly at the top level.
                b"configuration" => configurations.push(parse_configuration(&mut reader)?),
                _ => skip_element(&mut reader, &start)?,
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(configurations)
}

fn parse_monitors(reader: &mut XmlReader<'_>, configurations: &mut Vec<Configuration>) -> Result<()> {
    loop {
        match next_event(reader)? {
            Event::Start(start) if start.name().as_ref() == b"configuration" => {
                configurations.push(parse_configuration(reader)?);
            }
            Event::Start(start) => skip_element(reader, &start)?,
            Event::Empty(start) if start.name().as_ref() == b"configuration" => {
                configurations.push(Configuration::default());
            }
            Event::End(_) => return Ok(()),
            Event::Eof => return Err(unexpected_eof("monitors")),
            _ => {}
        }
    }
}

fn parse_configuration(reader: &mut XmlReader<'_>) -> Result<Configuration> {
    let mut config = Configuration::default();

    loop {
        match next_event(reader)? {
            Event::Start(start) => match start.name().as_ref() {
                b"output" => {
                    let output = new_parsed_output(reader, &start)?;
                    config.outputs.push(parse_output(reader, output)?);
                }
                b"clone" => config.clone = read_text(reader, "clone")? == "yes",
                _ => skip_element(reader, &start)?,
            },
            Event::Empty(start) if start.name().as_ref() == b"output" => {
                let output = new_parsed_output(reader, &start)?;
                config.outputs.push(finish_output(output));
            }
            Event::End(_) => return Ok(config),
            Event::Eof => return Err(unexpected_eof("configuration")),
            _ => {}
        }
    }
}

fn new_parsed_output(reader: &XmlReader<'_>, start: &BytesStart<'_>) -> Result<OutputInfo> {
    let name = match attribute(reader, start, "name")? {
        Some(name) => name,
        None => {
            warn!("Malformed monitor configuration file: <output> without a name");
            PLACEHOLDER_OUTPUT_NAME.to_string()
        }
    };

    // Anything the file does not mention is zero, off and disconnected.
    Ok(OutputInfo {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
        rate: 0,
        rotation: Rotation::empty(),
        ..OutputInfo::new(name)
    })
}

fn parse_output(reader: &mut XmlReader<'_>, mut output: OutputInfo) -> Result<OutputInfo> {
    loop {
        match next_event(reader)? {
            Event::Start(start) => {
                let element = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                let text = read_text(reader, &element)?;
                apply_property(&mut output, &element, &text);
            }
            Event::End(_) => return Ok(finish_output(output)),
            Event::Eof => return Err(unexpected_eof("output")),
            _ => {}
        }
    }
}

/// Geometry only makes sense for a lit output, and a lit output is plugged in.
fn mark_on(output: &mut OutputInfo) {
    output.on = true;
    output.connected = true;
}

/// Stores one `<output>` child. Unknown elements are ignored so the format
/// can grow without breaking older readers.
fn apply_property(output: &mut OutputInfo, element: &str, text: &str) {
    match element {
        "vendor" => {
            output.connected = true;
            output.vendor = text.chars().take(3).collect();
        }
        "product" => {
            output.connected = true;
            output.product = parse_int(text) as u16;
        }
        "serial" => {
            output.connected = true;
            output.serial = parse_int(text) as u32;
        }
        "width" => {
            mark_on(output);
            output.width = parse_int(text) as i32;
        }
        "height" => {
            mark_on(output);
            output.height = parse_int(text) as i32;
        }
        "rate" => {
            mark_on(output);
            output.rate = parse_int(text) as i32;
        }
        "x" => {
            mark_on(output);
            output.x = parse_int(text) as i32;
        }
        "y" => {
            mark_on(output);
            output.y = parse_int(text) as i32;
        }
        "rotation" => {
            if let Some(rotation) = Rotation::from_xml_name(text) {
                output.rotation |= rotation;
            }
        }
        "reflect_x" if text == "yes" => output.rotation |= Rotation::REFLECT_X,
        "reflect_y" if text == "yes" => output.rotation |= Rotation::REFLECT_Y,
        "primary" if text == "yes" => output.primary = true,
        _ => {}
    }
}

fn finish_output(mut output: OutputInfo) -> OutputInfo {
    if output.rotation.is_empty() {
        output.rotation = Rotation::ROTATE_0;
    }
    output
}

/// Collects the text directly inside the element just opened, consuming
/// everything up to and including its end tag.
fn read_text(reader: &mut XmlReader<'_>, element: &str) -> Result<String> {
    let mut text = String::new();
    let mut depth = 0usize;

    loop {
        match next_event(reader)? {
            Event::Text(t) if depth == 0 => {
                let unescaped = t.unescape().map_err(|e| malformed(reader, e))?;
                text.push_str(&unescaped);
            }
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(text.trim().to_string()),
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(unexpected_eof(element)),
            _ => {}
        }
    }
}

fn skip_element(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<()> {
    debug!(
        "skipping unknown element <{}>",
        String::from_utf8_lossy(start.name().as_ref())
    );
    reader.read_to_end(start.name()).map_err(|e| malformed(reader, e))?;
    Ok(())
}

fn attribute(reader: &XmlReader<'_>, start: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    let Some(attr) = start
        .try_get_attribute(name)
        .map_err(|e| malformed(reader, e.into()))?
    else {
        return Ok(None);
    };
    let value = attr.unescape_value().map_err(|e| malformed(reader, e))?;
    Ok(Some(value.into_owned()))
}

/// Integer parsing with C conventions: optional sign, then `0x` for hex,
/// a leading `0` for octal, decimal otherwise. Trailing junk is ignored and
/// text without any digits reads as 0.
pub fn parse_int(text: &str) -> i64 {
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map_or(digits.len(), |(i, _)| i);
    let value = match i64::from_str_radix(&digits[..end], radix) {
        Ok(value) => value,
        Err(_) if end == 0 && radix == 8 => 0,
        Err(e) => {
            warn!("could not parse integer {text:?} in monitor configuration: {e}");
            0
        }
    };

    if negative {
        -value
    } else {
        value
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn text_element(writer: &mut XmlWriter, name: &str, value: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn emit_output(writer: &mut XmlWriter, output: &OutputInfo) -> Result<()> {
    let start = BytesStart::new("output").with_attributes([("name", output.name.as_str())]);
    writer.write_event(Event::Start(start))?;

    if output.connected {
        text_element(writer, "vendor", &output.vendor)?;
        text_element(writer, "product", &format!("0x{:04x}", output.product))?;
        text_element(writer, "serial", &format!("0x{:08x}", output.serial))?;
    }

    // A disconnected output that is on does not make sense.
    if output.connected && output.on {
        text_element(writer, "width", &output.width.to_string())?;
        text_element(writer, "height", &output.height.to_string())?;
        text_element(writer, "rate", &output.rate.to_string())?;
        text_element(writer, "x", &output.x.to_string())?;
        text_element(writer, "y", &output.y.to_string())?;
        text_element(writer, "rotation", output.rotation.name())?;
        text_element(writer, "reflect_x", yes_no(output.rotation.contains(Rotation::REFLECT_X)))?;
        text_element(writer, "reflect_y", yes_no(output.rotation.contains(Rotation::REFLECT_Y)))?;
        text_element(writer, "primary", yes_no(output.primary))?;
    }

    writer.write_event(Event::End(BytesEnd::new("output")))?;
    Ok(())
}

fn emit_configuration(writer: &mut XmlWriter, config: &Configuration) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("configuration")))?;
    text_element(writer, "clone", yes_no(config.clone))?;
    for output in &config.outputs {
        emit_output(writer, output)?;
    }
    writer.write_event(Event::End(BytesEnd::new("configuration")))?;
    Ok(())
}

/// Renders `configurations` as a version 1 monitors file.
pub fn serialize(configurations: &[Configuration]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let version = FORMAT_VERSION.to_string();
    let root = BytesStart::new("monitors").with_attributes([("version", version.as_str())]);

    writer.write_event(Event::Start(root))?;
    for config in configurations {
        emit_configuration(&mut writer, config)?;
    }
    writer.write_event(Event::End(BytesEnd::new("monitors")))?;

    let mut text = String::from_utf8(writer.into_inner())
        .map_err(|e| Error::MalformedPersistedFile(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{arb_configuration, lit};
    use proptest::prelude::*;

    const VERSION_1: &str = r#"<monitors version="1">
  <configuration>
      <clone>no</clone>
      <output name="VGA">
      </output>
      <output name="LVDS">
          <vendor>LEN</vendor>
          <product>0x4035</product>
          <serial>0x00000000</serial>
          <width>1280</width>
          <height>800</height>
          <rate>60</rate>
          <x>0</x>
          <y>0</y>
          <rotation>left</rotation>
          <reflect_x>no</reflect_x>
          <reflect_y>yes</reflect_y>
          <primary>yes</primary>
          <brightness>0.8</brightness>
      </output>
  </configuration>
  <configuration>
      <clone>yes</clone>
      <output name="DVI-0">
          <vendor>SAMSUNG</vendor>
          <product>1234</product>
          <serial>0x10</serial>
      </output>
  </configuration>
</monitors>
"#;

    #[test]
    fn parses_version_1_file() {
        let configs = parse(VERSION_1).unwrap();
        assert_eq!(configs.len(), 2);

        let first = &configs[0];
        assert!(!first.clone);
        let vga = first.find_output("VGA").unwrap();
        assert!(!vga.connected && !vga.on);
        assert_eq!(vga.rotation, Rotation::ROTATE_0);

        let lvds = first.find_output("LVDS").unwrap();
        assert!(lvds.connected && lvds.on && lvds.primary);
        assert_eq!(lvds.vendor, "LEN");
        assert_eq!(lvds.product, 0x4035);
        assert_eq!((lvds.width, lvds.height, lvds.rate), (1280, 800, 60));
        assert_eq!(lvds.rotation, Rotation::ROTATE_90 | Rotation::REFLECT_Y);

        let second = &configs[1];
        assert!(second.clone);
        let dvi = second.find_output("DVI-0").unwrap();
        assert!(dvi.connected && !dvi.on);
        assert_eq!(dvi.vendor, "SAM");
        assert_eq!((dvi.product, dvi.serial), (1234, 16));
    }

    #[test]
    fn parses_legacy_file_without_wrapper() {
        let text = r#"<configuration>
  <clone>no</clone>
  <output name="DP-1"><vendor>DEL</vendor><width>1920</width><height>1080</height><rate>60</rate><x>0</x><y>0</y></output>
</configuration>
<configuration>
  <clone>no</clone>
  <output name="HDMI-1"/>
</configuration>
"#;
        let configs = parse(text).unwrap();
        assert_eq!(configs.len(), 2);
        let dp = configs[0].find_output("DP-1").unwrap();
        assert!(dp.on && dp.connected);
        assert_eq!(dp.width, 1920);
        assert_eq!(configs[1].outputs[0].name, "HDMI-1");
    }

    #[test]
    fn output_without_name_gets_placeholder() {
        let text = "<monitors version=\"1\"><configuration><output><x>5</x></output></configuration></monitors>";
        let configs = parse(text).unwrap();
        let output = &configs[0].outputs[0];
        assert_eq!(output.name, PLACEHOLDER_OUTPUT_NAME);
        assert!(output.on);
        assert_eq!(output.x, 5);
    }

    #[test]
    fn broken_markup_is_rejected() {
        let err = parse("<monitors version=\"1\"><configuration></output></monitors>").unwrap_err();
        assert!(matches!(err, Error::MalformedPersistedFile(_)), "{err}");

        let err = parse("<monitors version=\"1\"><configuration>").unwrap_err();
        assert!(matches!(err, Error::MalformedPersistedFile(_)), "{err}");
    }

    #[test]
    fn empty_input_has_no_configurations() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn c_style_integers() {
        assert_eq!(parse_int("0x4035"), 0x4035);
        assert_eq!(parse_int("0X1f"), 31);
        assert_eq!(parse_int("010"), 8);
        assert_eq!(parse_int("0"), 0);
        assert_eq!(parse_int(" -1920 "), -1920);
        assert_eq!(parse_int("60Hz"), 60);
        assert_eq!(parse_int("garbage"), 0);
        assert_eq!(parse_int("0xffffffff") as u32, u32::MAX);
    }

    #[test]
    fn serializes_only_meaningful_fields() {
        let mut off = lit("HDMI-1", 0, 0, 1, 1);
        off.on = false;
        let mut unplugged = lit("VGA-1", 0, 0, 1, 1);
        unplugged.connected = false;
        unplugged.on = false;
        let mut dp = lit("DP-1", 0, 0, 1920, 1080);
        dp.rotation = Rotation::ROTATE_270 | Rotation::REFLECT_X;
        dp.primary = true;

        let text = serialize(&[Configuration::new(false, vec![dp, off, unplugged])]).unwrap();
        assert!(text.trim_start().starts_with("<monitors version=\"1\">"));
        assert!(text.contains("<clone>no</clone>"));
        assert!(text.contains("<rotation>right</rotation>"));
        assert!(text.contains("<reflect_x>yes</reflect_x>"));
        assert!(text.contains("<product>0x0001</product>"));
        assert!(text.contains("<serial>0x00000004</serial>"));
        assert!(text.contains("<primary>yes</primary>"));
        // The disabled output only carries its identity.
        assert_eq!(text.matches("<width>").count(), 1);
        assert_eq!(text.matches("<vendor>").count(), 2);
        assert!(text.contains("<output name=\"VGA-1\">"));
    }

    #[test]
    fn lit_output_without_vendor_reads_back_connected() {
        let mut anonymous = lit("DP-1", 0, 0, 1920, 1080);
        anonymous.vendor.clear();
        let mut dark = lit("HDMI-1", 0, 0, 1, 1);
        dark.vendor.clear();
        dark.on = false;
        let config = Configuration::new(false, vec![anonymous, dark]);

        let parsed = parse(&serialize(&[config.clone()]).unwrap()).unwrap();
        let dp = parsed[0].find_output("DP-1").unwrap();
        assert!(dp.connected && dp.on);
        assert_eq!(dp.vendor, "");
        let hdmi = parsed[0].find_output("HDMI-1").unwrap();
        assert!(hdmi.connected && !hdmi.on);
        assert!(parsed[0].equivalent(&config));
        assert!(config.equivalent(&parsed[0]));

        // Geometry alone is enough to tell the output was plugged in.
        let text = "<monitors version=\"1\"><configuration><output name=\"DP-1\"><width>640</width></output></configuration></monitors>";
        let output = &parse(text).unwrap()[0].outputs[0];
        assert!(output.on && output.connected);
    }

    #[test]
    fn output_names_are_escaped() {
        let config = Configuration::new(false, vec![lit("a<b>&\"c\"", 0, 0, 10, 10)]);
        let text = serialize(&[config.clone()]).unwrap();
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed[0].outputs[0].name, "a<b>&\"c\"");
        assert!(parsed[0].equivalent(&config));
    }

    proptest! {
        #[test]
        fn serialized_configurations_read_back_equivalent(config in arb_configuration()) {
            let text = serialize(std::slice::from_ref(&config)).unwrap();
            let parsed = parse(&text).unwrap();
            prop_assert_eq!(parsed.len(), 1);
            prop_assert_eq!(parsed[0].clone, config.clone);
            prop_assert!(parsed[0].equivalent(&config));
            prop_assert!(config.equivalent(&parsed[0]));
        }
    }
}

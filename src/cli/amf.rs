use std::io::Write;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::value::{Tag, TaggedValue};
use serde_yaml_ng::{Mapping, Value};

use streamwire::structs::amf::{AmfProperties, AmfValue};
use streamwire::structs::command::Command;

use super::command::{AmfCommands, AmfDecodeArgs, AmfEncodeArgs, Cli};
use crate::input::{InputReader, create_output};

const TAG_ECMA_ARRAY: &str = "ecma";
const TAG_UNDEFINED: &str = "undefined";
const TAG_LONG_STRING: &str = "long";

/// YAML form of a command message.
///
/// ```yaml
/// name: connect
/// transaction_id: 1
/// arguments:
///   - app: live
///     tcUrl: rtmp://localhost/live
///   - !undefined null
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CommandDocument {
    pub name: String,
    pub transaction_id: i32,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

pub fn cmd_amf(command: &AmfCommands, cli: &Cli) -> Result<()> {
    match command {
        AmfCommands::Encode(args) => cmd_encode(args, cli),
        AmfCommands::Decode(args) => cmd_decode(args, cli),
    }
}

fn cmd_encode(args: &AmfEncodeArgs, _cli: &Cli) -> Result<()> {
    let data = InputReader::new(&args.input)?.read_all()?;
    let document: CommandDocument = serde_yaml_ng::from_slice(&data)
        .with_context(|| format!("Invalid command document {}", args.input.display()))?;

    let command = to_command(&document)?;
    log::info!(
        "Command '{}' (transaction {}), {} argument(s), body {} bytes",
        command.name(),
        command.transaction_id(),
        command.arguments().len(),
        command.body_size()
    );

    let mut output = create_output(&args.output)?;
    command.write_body(&mut output)?;
    output.flush()?;

    Ok(())
}

fn cmd_decode(args: &AmfDecodeArgs, cli: &Cli) -> Result<()> {
    let data = InputReader::new(&args.input)?.read_all()?;
    let declared = args.length.unwrap_or(data.len());

    if declared < data.len() {
        let message = format!(
            "{} bytes follow the declared body length {declared}",
            data.len() - declared
        );
        if cli.strict {
            bail!(message);
        }
        log::warn!("{message}");
    }

    let command = Command::read_body(&mut data.as_slice(), declared)
        .with_context(|| format!("Failed to decode {}", args.input.display()))?;

    print!("{}", serde_yaml_ng::to_string(&from_command(&command))?);
    Ok(())
}

pub fn to_command(document: &CommandDocument) -> Result<Command> {
    let mut command = Command::new(document.name.as_str(), document.transaction_id);
    for argument in &document.arguments {
        command.push(to_amf(argument)?)?;
    }
    Ok(command)
}

pub fn from_command(command: &Command) -> CommandDocument {
    CommandDocument {
        name: command.name().to_string(),
        transaction_id: command.transaction_id(),
        arguments: command.arguments().iter().map(from_amf).collect(),
    }
}

fn to_properties(mapping: &Mapping) -> Result<AmfProperties> {
    mapping
        .iter()
        .map(|(key, value)| match key {
            Value::String(key) => Ok((key.clone(), to_amf(value)?)),
            other => bail!("Object keys must be strings, found {other:?}"),
        })
        .collect()
}

fn to_amf(value: &Value) -> Result<AmfValue> {
    Ok(match value {
        Value::Null => AmfValue::Null,
        Value::Bool(b) => AmfValue::Boolean(*b),
        Value::Number(n) => match n.as_f64() {
            Some(n) => AmfValue::Number(n),
            None => bail!("Number {n} is not representable as a double"),
        },
        Value::String(s) => AmfValue::string(s.as_str()),
        Value::Sequence(items) => {
            AmfValue::StrictArray(items.iter().map(to_amf).collect::<Result<_>>()?)
        }
        Value::Mapping(mapping) => AmfValue::Object(to_properties(mapping)?),
        Value::Tagged(tagged) => {
            if tagged.tag == Tag::new(TAG_ECMA_ARRAY) {
                match &tagged.value {
                    Value::Mapping(mapping) => AmfValue::EcmaArray(to_properties(mapping)?),
                    _ => bail!("!{TAG_ECMA_ARRAY} expects a mapping"),
                }
            } else if tagged.tag == Tag::new(TAG_UNDEFINED) {
                AmfValue::Undefined
            } else if tagged.tag == Tag::new(TAG_LONG_STRING) {
                match &tagged.value {
                    Value::String(s) => AmfValue::LongString(s.clone()),
                    _ => bail!("!{TAG_LONG_STRING} expects a string"),
                }
            } else {
                bail!("Unsupported tag {}", tagged.tag)
            }
        }
    })
}

fn from_properties(properties: &AmfProperties) -> Mapping {
    properties
        .iter()
        .map(|(key, value)| (Value::String(key.clone()), from_amf(value)))
        .collect()
}

fn tagged(tag: &str, value: Value) -> Value {
    Value::Tagged(Box::new(TaggedValue {
        tag: Tag::new(tag),
        value,
    }))
}

fn from_amf(value: &AmfValue) -> Value {
    match value {
        AmfValue::Number(n) => Value::Number((*n).into()),
        AmfValue::Boolean(b) => Value::Bool(*b),
        AmfValue::String(s) => Value::String(s.clone()),
        AmfValue::LongString(s) => tagged(TAG_LONG_STRING, Value::String(s.clone())),
        AmfValue::Object(properties) => Value::Mapping(from_properties(properties)),
        AmfValue::Null => Value::Null,
        AmfValue::Undefined => tagged(TAG_UNDEFINED, Value::Null),
        AmfValue::EcmaArray(properties) => {
            tagged(TAG_ECMA_ARRAY, Value::Mapping(from_properties(properties)))
        }
        AmfValue::StrictArray(items) => Value::Sequence(items.iter().map(from_amf).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECT: &str = "\
name: connect
transaction_id: 1
arguments:
  - app: live
    audioCodecs: 3191
    fpad: false
  - !undefined null
  - !ecma {duration: 0}
  - [1, two]
";

    #[test]
    fn yaml_to_command() {
        let document: CommandDocument = serde_yaml_ng::from_str(CONNECT).unwrap();
        let command = to_command(&document).unwrap();

        assert_eq!(command.name(), "connect");
        assert_eq!(command.transaction_id(), 1);
        assert_eq!(
            command.arguments()[0],
            AmfValue::Object(vec![
                ("app".into(), AmfValue::string("live")),
                ("audioCodecs".into(), AmfValue::Number(3191.0)),
                ("fpad".into(), AmfValue::Boolean(false)),
            ])
        );
        assert_eq!(command.arguments()[1], AmfValue::Undefined);
        assert_eq!(
            command.arguments()[2],
            AmfValue::EcmaArray(vec![("duration".into(), AmfValue::Number(0.0))])
        );
        assert_eq!(
            command.arguments()[3],
            AmfValue::StrictArray(vec![AmfValue::Number(1.0), AmfValue::string("two")])
        );
    }

    #[test]
    fn decoded_body_back_to_yaml() {
        let document: CommandDocument = serde_yaml_ng::from_str(CONNECT).unwrap();
        let body = to_command(&document).unwrap().encode_body();

        let decoded = Command::decode_body(&body).unwrap();
        let yaml = serde_yaml_ng::to_string(&from_command(&decoded)).unwrap();
        let reparsed: CommandDocument = serde_yaml_ng::from_str(&yaml).unwrap();

        assert_eq!(to_command(&reparsed).unwrap().values(), decoded.values());
    }

    #[test]
    fn non_string_keys_rejected() {
        let document: CommandDocument =
            serde_yaml_ng::from_str("name: x\ntransaction_id: 0\narguments:\n  - 1: a\n").unwrap();
        assert!(to_command(&document).is_err());
    }
}

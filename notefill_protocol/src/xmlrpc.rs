// XML-RPC document reading and writing.
//
// The host talks to the bridge with plain XML-RPC `methodCall` /
// `methodResponse` documents over HTTP POST. Reading goes through quick-xml:
// the event stream is first folded into a small element tree, then the tree is
// interpreted as XML-RPC. Writing builds the document text directly, escaping
// text content with quick-xml's escaper.
//
// A `<value>` with no type element is a string.
// Element nesting is capped at `MAX_DEPTH`; deeper documents are malformed.
// Whitespace-only text between container elements is ignored; text inside a
// scalar element is kept as-is (strings are not trimmed).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::error::ProtocolError;
use crate::value::XmlRpcValue;

/// Deepest element nesting accepted in a document. A call carrying a song
/// snapshot and track options stays well under 30.
pub const MAX_DEPTH: usize = 64;

/// A decoded `methodCall`.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodCall {
    pub name: String,
    pub params: Vec<XmlRpcValue>,
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn expect_child(&self, name: &str) -> Result<&Element, ProtocolError> {
        self.child(name)
            .ok_or_else(|| ProtocolError::malformed(format!("<{}> has no <{name}>", self.name)))
    }
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Fold a document into its root element.
fn parse_tree(xml: &str) -> Result<Element, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(ProtocolError::malformed(format!(
                        "elements nested deeper than {MAX_DEPTH}"
                    )));
                }
                stack.push(Element {
                    name: element_name(e.name().as_ref()),
                    ..Element::default()
                });
            }
            Event::Empty(e) => {
                let el = Element {
                    name: element_name(e.name().as_ref()),
                    ..Element::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| ProtocolError::malformed("unbalanced end tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ProtocolError::malformed("unterminated element"));
    }
    root.ok_or_else(|| ProtocolError::malformed("empty document"))
}

fn parse_scalar<T: std::str::FromStr>(el: &Element) -> Result<T, ProtocolError> {
    el.text
        .trim()
        .parse()
        .map_err(|_| ProtocolError::malformed(format!("bad <{}> value {:?}", el.name, el.text)))
}

fn parse_value(value: &Element) -> Result<XmlRpcValue, ProtocolError> {
    let Some(typed) = value.children.first() else {
        return Ok(XmlRpcValue::String(value.text.clone()));
    };

    Ok(match typed.name.as_str() {
        "string" | "base64" | "dateTime.iso8601" => XmlRpcValue::String(typed.text.clone()),
        "int" | "i4" | "i8" => XmlRpcValue::Int(parse_scalar(typed)?),
        "double" => XmlRpcValue::Double(parse_scalar(typed)?),
        "boolean" => match typed.text.trim() {
            "1" | "true" => XmlRpcValue::Bool(true),
            "0" | "false" => XmlRpcValue::Bool(false),
            other => return Err(ProtocolError::malformed(format!("bad <boolean> value {other:?}"))),
        },
        "nil" => XmlRpcValue::Nil,
        "array" => {
            let data = typed.expect_child("data")?;
            XmlRpcValue::Array(
                data.children_named("value")
                    .map(parse_value)
                    .collect::<Result<_, _>>()?,
            )
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member.expect_child("name")?.text.clone();
                let v = parse_value(member.expect_child("value")?)?;
                members.insert(name, v);
            }
            XmlRpcValue::Struct(members)
        }
        other => return Err(ProtocolError::malformed(format!("unknown value type <{other}>"))),
    })
}

fn parse_params(params: Option<&Element>) -> Result<Vec<XmlRpcValue>, ProtocolError> {
    let Some(params) = params else {
        return Ok(Vec::new());
    };
    params
        .children_named("param")
        .map(|p| p.expect_child("value").and_then(parse_value))
        .collect()
}

pub fn parse_method_call(xml: &str) -> Result<MethodCall, ProtocolError> {
    let root = parse_tree(xml)?;
    if root.name != "methodCall" {
        return Err(ProtocolError::malformed(format!("expected <methodCall>, got <{}>", root.name)));
    }
    let name = root.expect_child("methodName")?.text.trim().to_string();
    if name.is_empty() {
        return Err(ProtocolError::malformed("empty methodName"));
    }
    let params = parse_params(root.child("params"))?;
    Ok(MethodCall { name, params })
}

/// Decode a `methodResponse`. A fault document becomes `ProtocolError::Fault`.
pub fn parse_method_response(xml: &str) -> Result<XmlRpcValue, ProtocolError> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(ProtocolError::malformed(format!(
            "expected <methodResponse>, got <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let detail = parse_value(fault.expect_child("value")?)?;
        return Err(ProtocolError::Fault {
            code: detail.get("faultCode").and_then(XmlRpcValue::as_i64).unwrap_or(0),
            message: detail
                .get("faultString")
                .and_then(XmlRpcValue::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    parse_params(root.child("params"))?
        .into_iter()
        .next()
        .ok_or_else(|| ProtocolError::malformed("response has no params"))
}

fn write_value(out: &mut String, value: &XmlRpcValue) {
    out.push_str("<value>");
    match value {
        XmlRpcValue::String(s) => {
            let _ = write!(out, "<string>{}</string>", escape(s));
        }
        XmlRpcValue::Int(i) => {
            if i32::try_from(*i).is_ok() {
                let _ = write!(out, "<int>{i}</int>");
            } else {
                let _ = write!(out, "<i8>{i}</i8>");
            }
        }
        XmlRpcValue::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        XmlRpcValue::Double(d) => {
            let _ = write!(out, "<double>{d:?}</double>");
        }
        XmlRpcValue::Nil => out.push_str("<nil/>"),
        XmlRpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        XmlRpcValue::Struct(members) => {
            out.push_str("<struct>");
            for (name, v) in members {
                let _ = write!(out, "<member><name>{}</name>", escape(name));
                write_value(out, v);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

const XML_DECL: &str = "<?xml version=\"1.0\"?>\n";

fn write_params(out: &mut String, params: &[XmlRpcValue]) {
    out.push_str("<params>");
    for p in params {
        out.push_str("<param>");
        write_value(out, p);
        out.push_str("</param>");
    }
    out.push_str("</params>");
}

pub fn write_response(value: &XmlRpcValue) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str("<methodResponse>");
    write_params(&mut out, std::slice::from_ref(value));
    out.push_str("</methodResponse>");
    out
}

pub fn write_fault(code: i64, message: &str) -> String {
    let detail = XmlRpcValue::Struct(BTreeMap::from([
        ("faultCode".to_string(), XmlRpcValue::Int(code)),
        ("faultString".to_string(), XmlRpcValue::String(message.to_string())),
    ]));
    let mut out = String::from(XML_DECL);
    out.push_str("<methodResponse><fault>");
    write_value(&mut out, &detail);
    out.push_str("</fault></methodResponse>");
    out
}

pub fn write_method_call(name: &str, params: &[XmlRpcValue]) -> String {
    let mut out = String::from(XML_DECL);
    let _ = write!(out, "<methodCall><methodName>{}</methodName>", escape(name));
    write_params(&mut out, params);
    out.push_str("</methodCall>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_CALL: &str = r#"<?xml version='1.0'?>
<methodCall>
<methodName>call_nn_infill</methodName>
<params>
<param>
<value><string>;M:0;I:0;&lt;extra_id_0&gt;N:60;d:240</string></value>
</param>
<param>
<value><struct>
<member>
<name>cpq</name>
<value><int>480</int></value>
</member>
<member>
<name>tracks</name>
<value><array><data>
<value><array><data>
<value><array><data><value><string>60;0;1;100</string></value><value><string>480;1</string></value></data></array></value>
</data></array></value>
</data></array></value>
</member>
</struct></value>
</param>
<param><value><boolean>1</boolean></value></param>
<param><value><int>10</int></value></param>
<param><value><i4>0</i4></value></param>
<param><value><boolean>0</boolean></value></param>
<param><value><double>0.85</double></value></param>
<param><value>bare string</value></param>
<param><value><nil/></value></param>
</params>
</methodCall>
"#;

    #[test]
    fn parses_host_call() {
        let call = parse_method_call(HOST_CALL).unwrap();
        assert_eq!(call.name, "call_nn_infill");
        assert_eq!(call.params.len(), 9);
        assert_eq!(
            call.params[0].as_str(),
            Some(";M:0;I:0;<extra_id_0>N:60;d:240")
        );
        assert_eq!(call.params[1].get("cpq"), Some(&XmlRpcValue::Int(480)));
        assert_eq!(call.params[2], XmlRpcValue::Bool(true));
        assert_eq!(call.params[4], XmlRpcValue::Int(0));
        assert_eq!(call.params[6], XmlRpcValue::Double(0.85));
        assert_eq!(call.params[7], XmlRpcValue::from("bare string"));
        assert!(call.params[8].is_nil());

        let tracks: serde_json::Value = call.params[1].get("tracks").cloned().map(Into::into).unwrap();
        assert_eq!(tracks, serde_json::json!([[["60;0;1;100", "480;1"]]]));
    }

    #[test]
    fn call_without_params() {
        let call = parse_method_call("<methodCall><methodName>check_libraries</methodName></methodCall>").unwrap();
        assert_eq!(call.name, "check_libraries");
        assert!(call.params.is_empty());
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse_method_call("<methodCall><methodName>x</methodName>").is_err());
        assert!(parse_method_call("<methodResponse/>").is_err());
        assert!(parse_method_call("").is_err());
        assert!(parse_method_call(
            "<methodCall><methodName>x</methodName><params><param><value><int>abc</int></value></param></params></methodCall>"
        )
        .is_err());
    }

    #[test]
    fn deeply_nested_values_are_rejected() {
        let levels = 50_000;
        let mut xml = String::from("<methodCall><methodName>x</methodName><params><param>");
        xml.push_str(&"<value><array><data>".repeat(levels));
        xml.push_str(&"</data></array></value>".repeat(levels));
        xml.push_str("</param></params></methodCall>");
        assert!(matches!(parse_method_call(&xml), Err(ProtocolError::Malformed(_))));

        // Nesting under the cap still parses.
        let mut value = XmlRpcValue::Int(1);
        for _ in 0..10 {
            value = XmlRpcValue::Array(vec![value]);
        }
        let call = parse_method_call(&write_method_call("x", std::slice::from_ref(&value))).unwrap();
        assert_eq!(call.params, vec![value]);
    }

    #[test]
    fn response_round_trips() {
        let value = XmlRpcValue::String("<extra_id_0>N:60;d:240 & more".into());
        let xml = write_response(&value);
        assert!(xml.contains("&lt;extra_id_0&gt;"));
        assert_eq!(parse_method_response(&xml).unwrap(), value);

        let nested = XmlRpcValue::Struct(BTreeMap::from([
            ("ok".to_string(), XmlRpcValue::Bool(true)),
            ("big".to_string(), XmlRpcValue::Int(1 << 40)),
            ("ratio".to_string(), XmlRpcValue::Double(1.0)),
            ("list".to_string(), XmlRpcValue::Array(vec![XmlRpcValue::Nil, XmlRpcValue::Int(-3)])),
        ]));
        assert_eq!(parse_method_response(&write_response(&nested)).unwrap(), nested);
    }

    #[test]
    fn fault_becomes_error() {
        let xml = write_fault(-32601, "method \"nope\" is not supported");
        match parse_method_response(&xml) {
            Err(ProtocolError::Fault { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "method \"nope\" is not supported");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn method_call_round_trips() {
        let params = vec![XmlRpcValue::from("s"), XmlRpcValue::Int(7)];
        let call = parse_method_call(&write_method_call("call_nn_infill", &params)).unwrap();
        assert_eq!(call.name, "call_nn_infill");
        assert_eq!(call.params, params);
    }
}

//! Forward-only XML sink used by every encoder.
//!
//! Nothing is buffered into a tree: each call turns into one quick-xml event
//! written straight to the underlying `Write`. Any failure of the sink is
//! reported as [`KmlError::Stream`] so callers can tell a dead client apart
//! from a bad feature.

use std::io::{self, Write};

use kml_common::{KmlError, KmlResult};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

pub struct KmlWriter<W: Write> {
    inner: Writer<W>,
}

impl<W: Write> KmlWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            inner: Writer::new(sink),
        }
    }

    /// Pretty-printed output, two spaces per level.
    pub fn indented(sink: W) -> Self {
        Self {
            inner: Writer::new_with_indent(sink, b' ', 2),
        }
    }

    pub fn declaration(&mut self) -> KmlResult<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    /// Open the `<kml>` root with the KML and Atom namespaces.
    pub fn start_kml(&mut self) -> KmlResult<()> {
        self.start_with(
            "kml",
            &[("xmlns", KML_NAMESPACE), ("xmlns:atom", ATOM_NAMESPACE)],
        )
    }

    pub fn start(&mut self, name: &str) -> KmlResult<()> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    pub fn start_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> KmlResult<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.write(Event::Start(start))
    }

    pub fn empty_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> KmlResult<()> {
        let mut start = BytesStart::new(name);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.write(Event::Empty(start))
    }

    pub fn end(&mut self, name: &str) -> KmlResult<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// Escaped character data.
    pub fn text(&mut self, text: &str) -> KmlResult<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    /// Character data wrapped in a CDATA section. Text that would close the
    /// section early is escaped instead.
    pub fn cdata(&mut self, text: &str) -> KmlResult<()> {
        if text.contains("]]>") {
            return self.text(text);
        }
        self.write(Event::CData(BytesCData::new(text)))
    }

    /// `<name>text</name>`
    pub fn element(&mut self, name: &str, text: &str) -> KmlResult<()> {
        self.start(name)?;
        self.text(text)?;
        self.end(name)
    }

    pub fn cdata_element(&mut self, name: &str, text: &str) -> KmlResult<()> {
        self.start(name)?;
        self.cdata(text)?;
        self.end(name)
    }

    pub fn flush(&mut self) -> KmlResult<()> {
        self.inner.get_mut().flush().map_err(KmlError::Stream)
    }

    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }

    fn write(&mut self, event: Event<'_>) -> KmlResult<()> {
        self.inner.write_event(event).map_err(stream_error)
    }
}

fn stream_error(err: quick_xml::Error) -> KmlError {
    match err {
        quick_xml::Error::Io(io) => KmlError::Stream(io::Error::new(io.kind(), io.to_string())),
        other => KmlError::Stream(io::Error::new(io::ErrorKind::Other, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render<F: FnOnce(&mut KmlWriter<Vec<u8>>) -> KmlResult<()>>(f: F) -> String {
        let mut w = KmlWriter::new(Vec::new());
        f(&mut w).unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn test_escaping() {
        let xml = render(|w| w.element("name", "a < b & c"));
        assert_eq!(xml, "<name>a &lt; b &amp; c</name>");
    }

    #[test]
    fn test_cdata() {
        let xml = render(|w| w.cdata_element("description", "<b>bold</b>"));
        assert_eq!(xml, "<description><![CDATA[<b>bold</b>]]></description>");

        let xml = render(|w| w.cdata_element("description", "x]]>y"));
        assert_eq!(xml, "<description>x]]&gt;y</description>");
    }

    #[test]
    fn test_attributes() {
        let xml = render(|w| w.empty_with("atom:link", &[("rel", "self"), ("href", "a?b=1&c=2")]));
        assert_eq!(xml, r#"<atom:link rel="self" href="a?b=1&amp;c=2"/>"#);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_stream_error() {
        let mut w = KmlWriter::new(BrokenPipe);
        let err = w.start("kml").unwrap_err();
        assert!(matches!(err, KmlError::Stream(_)));
        assert!(err.is_client_disconnect());
    }
}

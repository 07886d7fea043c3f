use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::util::unescape_html;

/// Suffix every Atom 1.0 namespace URI carries (`http://www.w3.org/2005/Atom`).
const ATOM_NS_SUFFIX: &[u8] = b"/2005/Atom";

/// Strict Atom `updated` layout. Offsets other than `Z` are rejected.
const ATOM_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// RFC 822 layouts tried when a `pubDate` carries no zone.
const RSS_ZONELESS_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S", "%d %b %Y %H:%M:%S"];

/// Errors raised while turning feed bytes into items.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No supported schema recognized the document.
    #[error("unable to parse source: {}", .0.join("; "))]
    SourceFormat(Vec<String>),

    /// A required field is missing from an item of an identified schema.
    #[error("invalid {schema} feed: item is missing required field `{field}`")]
    FieldValidation {
        schema: &'static str,
        field: &'static str,
    },

    /// A date field of an identified schema could not be parsed.
    #[error("invalid {schema} feed: cannot parse date {value:?}")]
    InvalidDate { schema: &'static str, value: String },

    /// The XML reader failed after the schema was identified.
    #[error("XML parse error: {0}")]
    Xml(String),
}

/// Document-level metadata extracted once per feed.
///
/// Keys the feed does not provide stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDefaults {
    pub sitename: Option<String>,
    pub www_root: Option<String>,
    pub lang: Option<String>,
    pub author: Option<String>,
}

/// A normalized feed item. RSS and Atom items look identical at this point.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    /// Publication instant, expressed in local time.
    pub date: DateTime<Local>,
    pub link: String,
    /// Raw HTML body, already entity-unescaped where the schema requires it.
    pub content: String,
}

/// The syndication schemas understood by [`parse`], in trial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Rss20,
    Atom,
}

impl Schema {
    const ALL: [Schema; 2] = [Schema::Rss20, Schema::Atom];

    pub fn name(self) -> &'static str {
        match self {
            Schema::Rss20 => "RSS 2.0",
            Schema::Atom => "Atom",
        }
    }

    /// Whether an element in namespace `ns` belongs to the schema's vocabulary.
    fn owns_namespace(self, ns: Option<&[u8]>) -> bool {
        match self {
            Schema::Rss20 => ns.is_none(),
            Schema::Atom => ns.is_some_and(|ns| ns.ends_with(ATOM_NS_SUFFIX)),
        }
    }

    fn owns(self, ns: &ResolveResult<'_>) -> bool {
        match ns {
            ResolveResult::Bound(ns) => self.owns_namespace(Some(ns.as_ref())),
            ResolveResult::Unbound => self.owns_namespace(None),
            ResolveResult::Unknown(_) => false,
        }
    }

    fn root_tag(self) -> &'static [u8] {
        match self {
            Schema::Rss20 => b"rss",
            Schema::Atom => b"feed",
        }
    }

    fn item_tag(self) -> &'static [u8] {
        match self {
            Schema::Rss20 => b"item",
            Schema::Atom => b"entry",
        }
    }

    /// Number of open elements around an item: `rss/channel` or `feed`.
    fn item_depth(self) -> usize {
        match self {
            Schema::Rss20 => 2,
            Schema::Atom => 1,
        }
    }

    /// Element paths (below the root) feeding each [`FeedDefaults`] key.
    fn default_paths(self) -> &'static [(&'static [&'static str], DefaultKey)] {
        match self {
            Schema::Rss20 => &[
                (&["channel", "title"], DefaultKey::Sitename),
                (&["channel", "link"], DefaultKey::WwwRoot),
                (&["channel", "language"], DefaultKey::Lang),
            ],
            Schema::Atom => &[
                (&["title"], DefaultKey::Sitename),
                (&["id"], DefaultKey::WwwRoot),
                (&["author", "name"], DefaultKey::Author),
            ],
        }
    }

    fn normalize(self, fields: Fields) -> Result<FeedItem, ParseError> {
        match self {
            Schema::Rss20 => normalize_rss(fields),
            Schema::Atom => normalize_atom(fields),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of trying one schema against a document.
#[derive(Debug)]
pub enum Attempt {
    Matched(FeedDefaults),
    NotThisSchema(String),
}

#[derive(Debug, Clone, Copy)]
enum DefaultKey {
    Sitename,
    WwwRoot,
    Lang,
    Author,
}

/// Parses a feed, identifying its schema before any item is produced.
///
/// Returns the document defaults and a lazy iterator over the items.
/// Schemas are tried in order (RSS 2.0, then Atom); the first whose root
/// signature matches is used for the whole document.
///
/// # Errors
///
/// - [`ParseError::SourceFormat`] when no schema matches; the message lists
///   the rejection reason of every attempt.
///
/// Item-level failures ([`ParseError::FieldValidation`],
/// [`ParseError::InvalidDate`]) surface from the iterator.
pub fn parse(bytes: &[u8]) -> Result<(FeedDefaults, FeedItems<'_>), ParseError> {
    let mut rejected = Vec::with_capacity(Schema::ALL.len());

    for schema in Schema::ALL {
        match attempt(schema, bytes) {
            Attempt::Matched(defaults) => {
                tracing::debug!(schema = %schema, "Feed schema identified");
                return Ok((defaults, FeedItems::new(schema, bytes)));
            }
            Attempt::NotThisSchema(reason) => {
                tracing::debug!(schema = %schema, reason = %reason, "Feed schema rejected");
                rejected.push(reason);
            }
        }
    }

    Err(ParseError::SourceFormat(rejected))
}

/// Checks a document against one schema's structural signature and, on a
/// match, reads its defaults.
pub fn attempt(schema: Schema, bytes: &[u8]) -> Attempt {
    let root = match inspect(bytes) {
        Ok(root) => root,
        Err(reason) => {
            return Attempt::NotThisSchema(format!(
                "not an {} feed: no well-formed XML ({})",
                schema, reason
            ))
        }
    };

    if !(root.owned_by(schema) && root.local_name == schema.root_tag()) {
        return Attempt::NotThisSchema(format!(
            "not an {} feed: root element is <{}>",
            schema,
            String::from_utf8_lossy(&root.local_name)
        ));
    }

    match read_defaults(schema, bytes) {
        Ok(defaults) => Attempt::Matched(defaults),
        Err(e) => Attempt::NotThisSchema(format!("not an {} feed: {}", schema, e)),
    }
}

fn reader(bytes: &[u8]) -> NsReader<&[u8]> {
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    reader
}

fn xml_error(e: impl fmt::Display) -> ParseError {
    ParseError::Xml(e.to_string())
}

struct Root {
    namespace: Option<Vec<u8>>,
    local_name: Vec<u8>,
}

impl Root {
    fn new(namespace: Option<Vec<u8>>, e: &BytesStart<'_>) -> Self {
        Self {
            namespace,
            local_name: e.local_name().as_ref().to_vec(),
        }
    }

    fn owned_by(&self, schema: Schema) -> bool {
        schema.owns_namespace(self.namespace.as_deref())
    }
}

/// Walks the whole document once, checking well-formedness, and reports the
/// root element.
fn inspect(bytes: &[u8]) -> Result<Root, String> {
    // SEC-002: quick-xml never expands <!ENTITY> declarations. Undefined
    // references fail in `unescape()` below, which is what makes them
    // ill-formed here.
    let mut reader = reader(bytes);
    let mut depth: usize = 0;
    let mut root: Option<Root> = None;

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(|e| e.to_string())?;
        let namespace = match ns {
            ResolveResult::Bound(ns) => Some(ns.as_ref().to_vec()),
            _ => None,
        };

        match event {
            Event::Start(e) => {
                if depth == 0 {
                    if root.is_some() {
                        return Err("multiple root elements".to_string());
                    }
                    root = Some(Root::new(namespace, &e));
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 0 => {
                if root.is_some() {
                    return Err("multiple root elements".to_string());
                }
                root = Some(Root::new(namespace, &e));
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(_) | Event::CData(_) if depth == 0 => {
                return Err("character data outside the root element".to_string());
            }
            Event::Text(t) => {
                t.unescape().map_err(|e| e.to_string())?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err("unexpected end of document".to_string());
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

/// Collects the channel-level metadata named by [`Schema::default_paths`].
fn read_defaults(schema: Schema, bytes: &[u8]) -> Result<FeedDefaults, ParseError> {
    let paths = schema.default_paths();
    let mut reader = reader(bytes);
    // Local names of the open elements; `None` marks a foreign namespace.
    let mut stack: Vec<Option<Vec<u8>>> = Vec::new();
    let mut values: Vec<Option<String>> = vec![None; paths.len()];
    let mut closed = vec![false; paths.len()];

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(xml_error)?;
        let owned = schema.owns(&ns);

        match event {
            Event::Start(e) => stack.push(owned.then(|| e.local_name().as_ref().to_vec())),
            Event::End(_) => {
                if let Some(i) = matching_path(paths, &stack) {
                    if values[i].is_some() {
                        closed[i] = true;
                    }
                }
                stack.pop();
            }
            Event::Text(t) => {
                if let Some(i) = matching_path(paths, &stack).filter(|&i| !closed[i]) {
                    let text = t.unescape().map_err(xml_error)?;
                    values[i].get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(i) = matching_path(paths, &stack).filter(|&i| !closed[i]) {
                    let text = reader.decoder().decode(&c).map_err(xml_error)?;
                    values[i].get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut defaults = FeedDefaults::default();
    for ((_, key), value) in paths.iter().zip(values) {
        let value = value.filter(|v| !v.is_empty());
        match key {
            DefaultKey::Sitename => defaults.sitename = value,
            DefaultKey::WwwRoot => defaults.www_root = value,
            DefaultKey::Lang => defaults.lang = value,
            DefaultKey::Author => defaults.author = value,
        }
    }
    Ok(defaults)
}

/// Index of the default path equal to the open-element stack below the root.
fn matching_path(
    paths: &[(&'static [&'static str], DefaultKey)],
    stack: &[Option<Vec<u8>>],
) -> Option<usize> {
    let below_root = stack.get(1..)?;
    paths.iter().position(|(path, _)| {
        path.len() == below_root.len()
            && path
                .iter()
                .zip(below_root)
                .all(|(want, seg)| seg.as_deref() == Some(want.as_bytes()))
    })
}

/// Lazy, single-pass iterator over the items of an identified feed.
///
/// Each call to `next()` reads just far enough to produce one item. The
/// iterator stops for good after the first error.
pub struct FeedItems<'a> {
    schema: Schema,
    bytes: &'a [u8],
    reader: NsReader<&'a [u8]>,
    depth: usize,
    finished: bool,
}

impl<'a> FeedItems<'a> {
    fn new(schema: Schema, bytes: &'a [u8]) -> Self {
        Self {
            schema,
            bytes,
            reader: reader(bytes),
            depth: 0,
            finished: false,
        }
    }

    /// The schema the document was identified as.
    pub fn schema(&self) -> Schema {
        self.schema
    }

    fn next_item(&mut self) -> Result<Option<FeedItem>, ParseError> {
        loop {
            let (ns, event) = self.reader.read_resolved_event().map_err(xml_error)?;
            let at_item_level =
                self.schema.owns(&ns) && self.depth == self.schema.item_depth();

            match event {
                Event::Start(e) => {
                    if at_item_level && e.local_name().as_ref() == self.schema.item_tag() {
                        let fields = self.read_fields()?;
                        return self.schema.normalize(fields).map(Some);
                    }
                    self.depth += 1;
                }
                Event::Empty(e)
                    if at_item_level && e.local_name().as_ref() == self.schema.item_tag() =>
                {
                    return self.schema.normalize(Fields::default()).map(Some);
                }
                Event::End(_) => self.depth = self.depth.saturating_sub(1),
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Reads the direct children of the item whose start tag was just
    /// consumed, up to and including its end tag.
    ///
    /// Children with `type="xhtml"` keep their inner markup verbatim.
    fn read_fields(&mut self) -> Result<Fields, ParseError> {
        let decoder = self.reader.decoder();
        let mut fields = Fields::default();
        let mut depth: usize = 0;
        let mut current: Option<(Vec<u8>, Field)> = None;
        // Offset just past the start tag of an xhtml child.
        let mut markup_start: Option<usize> = None;

        loop {
            let before = self.reader.buffer_position() as usize;
            let (ns, event) = self.reader.read_resolved_event().map_err(xml_error)?;
            let owned = self.schema.owns(&ns);

            match event {
                Event::Start(e) => {
                    if depth == 0 && owned {
                        let field = Field::from_start(&e, decoder)?;
                        if field.attr("type") == Some("xhtml") {
                            markup_start = Some(self.reader.buffer_position() as usize);
                        }
                        current = Some((e.local_name().as_ref().to_vec(), field));
                    }
                    depth += 1;
                }
                Event::Empty(e) => {
                    if depth == 0 && owned {
                        let field = Field::from_start(&e, decoder)?;
                        fields.push(e.local_name().as_ref().to_vec(), field);
                    }
                }
                Event::Text(t) if depth == 1 => {
                    if let Some((_, field)) = current.as_mut() {
                        field.text.push_str(&t.unescape().map_err(xml_error)?);
                    }
                }
                Event::CData(c) if depth == 1 => {
                    if let Some((_, field)) = current.as_mut() {
                        field.text.push_str(&decoder.decode(&c).map_err(xml_error)?);
                    }
                }
                Event::End(_) => {
                    if depth == 0 {
                        return Ok(fields);
                    }
                    depth -= 1;
                    if depth == 0 {
                        if let Some((name, mut field)) = current.take() {
                            if let Some(start) = markup_start.take() {
                                let raw = self.bytes.get(start..before).ok_or_else(|| {
                                    ParseError::Xml("element offsets out of range".to_string())
                                })?;
                                let markup = decoder.decode(raw).map_err(xml_error)?;
                                field.text = markup.trim().to_string();
                            }
                            fields.push(name, field);
                        }
                    }
                }
                Event::Eof => {
                    return Err(ParseError::Xml(format!(
                        "document ended inside <{}>",
                        String::from_utf8_lossy(self.schema.item_tag())
                    )))
                }
                _ => {}
            }
        }
    }
}

impl Iterator for FeedItems<'_> {
    type Item = Result<FeedItem, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for FeedItems<'_> {}

impl fmt::Debug for FeedItems<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedItems")
            .field("schema", &self.schema)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// One child element of an item: its text and attributes.
#[derive(Debug, Default)]
struct Field {
    text: String,
    attrs: HashMap<String, String>,
}

impl Field {
    fn from_start(e: &BytesStart<'_>, decoder: Decoder) -> Result<Self, ParseError> {
        let mut attrs = HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(xml_error)?;
            let value = attr
                .decode_and_unescape_value(decoder)
                .map_err(xml_error)?
                .into_owned();
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            attrs.insert(key, value);
        }
        Ok(Self {
            text: String::new(),
            attrs,
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Children of one item, keyed by local name, in document order.
#[derive(Debug, Default)]
struct Fields(HashMap<Vec<u8>, Vec<Field>>);

impl Fields {
    fn push(&mut self, name: Vec<u8>, field: Field) {
        self.0.entry(name).or_default().push(field);
    }

    fn all(&self, name: &str) -> &[Field] {
        self.0.get(name.as_bytes()).map(Vec::as_slice).unwrap_or(&[])
    }

    fn first(&self, name: &str) -> Option<&Field> {
        self.all(name).first()
    }

    /// Text of the first `name` child; empty text counts as absent.
    fn text(&self, name: &str) -> Option<&str> {
        self.first(name)
            .map(|f| f.text.as_str())
            .filter(|t| !t.is_empty())
    }

    fn required(&self, schema: Schema, field: &'static str) -> Result<&str, ParseError> {
        self.text(field).ok_or(ParseError::FieldValidation {
            schema: schema.name(),
            field,
        })
    }
}

fn normalize_rss(fields: Fields) -> Result<FeedItem, ParseError> {
    let schema = Schema::Rss20;
    let title = fields.required(schema, "title")?;
    let pub_date = fields.required(schema, "pubDate")?;
    let link = fields.required(schema, "link")?;
    let description = fields.required(schema, "description")?;

    Ok(FeedItem {
        title: title.to_string(),
        date: parse_rfc822(pub_date)?,
        link: link.to_string(),
        content: unescape_html(description).into_owned(),
    })
}

fn normalize_atom(fields: Fields) -> Result<FeedItem, ParseError> {
    let schema = Schema::Atom;
    let title = fields.required(schema, "title")?;
    let updated = fields.required(schema, "updated")?;
    let link = atom_link(&fields).ok_or(ParseError::FieldValidation {
        schema: schema.name(),
        field: "link",
    })?;
    let content = fields.required(schema, "content")?;

    // `type` defaults to "text"; only "html" content carries escaped markup.
    let content = match fields.first("content").and_then(|f| f.attr("type")) {
        Some("html") => unescape_html(content).into_owned(),
        _ => content.to_string(),
    };

    Ok(FeedItem {
        title: title.to_string(),
        date: parse_atom_date(updated)?,
        link: link.to_string(),
        content,
    })
}

/// Picks the entry's alternate link, falling back to any link `href`, then
/// to link text.
fn atom_link(fields: &Fields) -> Option<&str> {
    let links = fields.all("link");
    links
        .iter()
        .filter(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .find_map(href)
        .or_else(|| links.iter().find_map(href))
        .or_else(|| links.iter().map(|l| l.text.as_str()).find(|t| !t.is_empty()))
}

fn href(link: &Field) -> Option<&str> {
    link.attr("href").filter(|h| !h.is_empty())
}

/// Parses an RSS `pubDate`. Dates without a zone are read as local time.
fn parse_rfc822(value: &str) -> Result<DateTime<Local>, ParseError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Ok(dt.with_timezone(&Local));
    }

    RSS_ZONELESS_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .ok_or_else(|| ParseError::InvalidDate {
            schema: Schema::Rss20.name(),
            value: value.to_string(),
        })
}

/// Parses an Atom `updated` stamp, which must be UTC (`Z`).
fn parse_atom_date(value: &str) -> Result<DateTime<Local>, ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), ATOM_DATE_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive).with_timezone(&Local))
        .map_err(|_| ParseError::InvalidDate {
            schema: Schema::Atom.name(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <language>en</language>
    <item>
      <title>First post</title>
      <link>https://example.com/2002/first-post/</link>
      <pubDate>Wed, 02 Oct 2002 13:00:00 GMT</pubDate>
      <description>&lt;p&gt;Tom &amp;amp; Jerry&amp;#8217;s&lt;/p&gt;</description>
    </item>
    <item>
      <title>Second post</title>
      <link>https://example.com/2002/second-post/</link>
      <pubDate>Thu, 03 Oct 2002 08:30:00 +0200</pubDate>
      <description><![CDATA[<p>Raw &amp; ready</p>]]></description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <id>https://example.org/</id>
  <author><name>Jane Doe</name></author>
  <entry>
    <title>Atom entry</title>
    <link rel="self" href="https://example.org/self"/>
    <link href="https://example.org/2002/atom-entry.html"/>
    <updated>2002-10-02T13:00:00Z</updated>
    <content type="html">&lt;p&gt;Fish &amp;amp; chips&lt;/p&gt;</content>
  </entry>
  <entry>
    <title>Plain entry</title>
    <link href="https://example.org/plain"/>
    <updated>2002-10-03T09:15:00Z</updated>
    <content>Fish &amp;amp; chips</content>
  </entry>
</feed>"#;

    fn utc(item: &FeedItem) -> DateTime<Utc> {
        item.date.with_timezone(&Utc)
    }

    #[test]
    fn test_rss_defaults_then_items() {
        let (defaults, items) = parse(RSS.as_bytes()).unwrap();
        assert_eq!(
            defaults,
            FeedDefaults {
                sitename: Some("Example Blog".into()),
                www_root: Some("https://example.com/".into()),
                lang: Some("en".into()),
                author: None,
            }
        );
        assert_eq!(items.schema(), Schema::Rss20);

        let items: Vec<FeedItem> = items.collect::<Result<_, _>>().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First post");
        assert_eq!(items[0].link, "https://example.com/2002/first-post/");
        assert_eq!(items[0].content, "<p>Tom & Jerry\u{2019}s</p>");
        assert_eq!(
            utc(&items[0]),
            Utc.with_ymd_and_hms(2002, 10, 2, 13, 0, 0).unwrap()
        );
        assert_eq!(
            utc(&items[1]),
            Utc.with_ymd_and_hms(2002, 10, 3, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_rss_cdata_description_is_unescaped() {
        let (_, items) = parse(RSS.as_bytes()).unwrap();
        let second = items.into_iter().nth(1).unwrap().unwrap();
        assert_eq!(second.content, "<p>Raw & ready</p>");
    }

    #[test]
    fn test_atom_defaults_then_items() {
        let (defaults, items) = parse(ATOM.as_bytes()).unwrap();
        assert_eq!(defaults.sitename.as_deref(), Some("Example Atom"));
        assert_eq!(defaults.www_root.as_deref(), Some("https://example.org/"));
        assert_eq!(defaults.author.as_deref(), Some("Jane Doe"));
        assert_eq!(defaults.lang, None);
        assert_eq!(items.schema(), Schema::Atom);

        let items: Vec<FeedItem> = items.collect::<Result<_, _>>().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link, "https://example.org/2002/atom-entry.html");
        assert_eq!(items[0].content, "<p>Fish & chips</p>");
        // Content without type="html" is taken as-is (XML-decoded only).
        assert_eq!(items[1].content, "Fish &amp; chips");
    }

    #[test]
    fn test_rss_and_atom_dates_agree() {
        let (_, rss) = parse(RSS.as_bytes()).unwrap();
        let (_, atom) = parse(ATOM.as_bytes()).unwrap();
        let rss_first = rss.into_iter().next().unwrap().unwrap();
        let atom_first = atom.into_iter().next().unwrap().unwrap();
        assert_eq!(rss_first.date, atom_first.date);
    }

    #[test]
    fn test_unknown_root_mentions_both_schemas() {
        let html = "<html><body><p>hello</p></body></html>";
        let err = parse(html.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::SourceFormat(ref r) if r.len() == 2));
        let msg = err.to_string();
        assert!(msg.contains("RSS 2.0"), "{msg}");
        assert!(msg.contains("Atom"), "{msg}");
        assert!(msg.contains("<html>"), "{msg}");
    }

    #[test]
    fn test_malformed_xml_is_source_format_error() {
        let err = parse(b"<rss><channel></rss>").unwrap_err();
        match err {
            ParseError::SourceFormat(reasons) => {
                assert!(reasons.iter().all(|r| r.contains("no well-formed XML")));
            }
            e => panic!("Expected SourceFormat, got {:?}", e),
        }
    }

    #[test]
    fn test_truncated_document_is_not_well_formed() {
        assert!(matches!(
            parse(b"<rss version=\"2.0\"><channel>"),
            Err(ParseError::SourceFormat(_))
        ));
    }

    #[test]
    fn test_atom_root_without_namespace_rejected() {
        let err = parse(b"<feed><title>x</title></feed>").unwrap_err();
        assert!(err.to_string().contains("not an Atom feed"));
    }

    #[test]
    fn test_rss_missing_pub_date_is_field_error_not_fallback() {
        let doc = r#"<rss version="2.0"><channel>
            <item><title>t</title><link>https://e.com/a</link><description>d</description></item>
        </channel></rss>"#;
        let (_, mut items) = parse(doc.as_bytes()).unwrap();
        match items.next().unwrap() {
            Err(ParseError::FieldValidation { schema, field }) => {
                assert_eq!(schema, "RSS 2.0");
                assert_eq!(field, "pubDate");
            }
            other => panic!("Expected FieldValidation, got {:?}", other),
        }
        assert!(items.next().is_none());
    }

    #[test]
    fn test_valid_items_precede_the_failing_one() {
        let doc = r#"<rss version="2.0"><channel>
            <item><title>ok</title><link>https://e.com/a</link>
              <pubDate>Wed, 02 Oct 2002 13:00:00 GMT</pubDate><description>d</description></item>
            <item><title>broken</title></item>
            <item><title>never reached</title></item>
        </channel></rss>"#;
        let (_, items) = parse(doc.as_bytes()).unwrap();
        let results: Vec<_> = items.collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().title, "ok");
        assert!(matches!(
            results[1],
            Err(ParseError::FieldValidation { field: "pubDate", .. })
        ));
    }

    #[test]
    fn test_empty_field_counts_as_missing() {
        let doc = r#"<rss version="2.0"><channel>
            <item><title>   </title><link>https://e.com/a</link>
              <pubDate>Wed, 02 Oct 2002 13:00:00 GMT</pubDate><description>d</description></item>
        </channel></rss>"#;
        let (_, mut items) = parse(doc.as_bytes()).unwrap();
        assert!(matches!(
            items.next(),
            Some(Err(ParseError::FieldValidation { field: "title", .. }))
        ));
    }

    #[test]
    fn test_atom_missing_content_is_field_error() {
        let doc = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <title>t</title><link href="https://e.org/a"/><updated>2002-10-02T13:00:00Z</updated>
        </entry></feed>"#;
        let (defaults, mut items) = parse(doc.as_bytes()).unwrap();
        assert_eq!(defaults, FeedDefaults::default());
        assert!(matches!(
            items.next(),
            Some(Err(ParseError::FieldValidation {
                schema: "Atom",
                field: "content"
            }))
        ));
    }

    #[test]
    fn test_atom_date_with_offset_rejected() {
        let doc = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <title>t</title><link href="https://e.org/a"/>
            <updated>2002-10-02T13:00:00+02:00</updated><content>c</content>
        </entry></feed>"#;
        let (_, mut items) = parse(doc.as_bytes()).unwrap();
        assert!(matches!(
            items.next(),
            Some(Err(ParseError::InvalidDate { schema: "Atom", .. }))
        ));
    }

    #[test]
    fn test_rss_date_without_zone_is_local() {
        let date = parse_rfc822("Wed, 02 Oct 2002 13:00:00").unwrap();
        assert_eq!(
            date.naive_local(),
            NaiveDateTime::parse_from_str("2002-10-02 13:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
        );
    }

    #[test]
    fn test_rss_garbage_date_rejected() {
        assert!(matches!(
            parse_rfc822("yesterday-ish"),
            Err(ParseError::InvalidDate { schema: "RSS 2.0", .. })
        ));
    }

    #[test]
    fn test_partial_rss_defaults() {
        let doc = r#"<rss version="2.0"><channel><title>Only title</title></channel></rss>"#;
        let (defaults, mut items) = parse(doc.as_bytes()).unwrap();
        assert_eq!(defaults.sitename.as_deref(), Some("Only title"));
        assert_eq!(defaults.www_root, None);
        assert_eq!(defaults.lang, None);
        assert!(items.next().is_none());
    }

    #[test]
    fn test_foreign_namespace_children_ignored() {
        let doc = r#"<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel>
            <item><title>t</title><link>https://e.com/a</link>
              <content:encoded>ignored</content:encoded>
              <pubDate>Wed, 02 Oct 2002 13:00:00 GMT</pubDate><description>kept</description></item>
        </channel></rss>"#;
        let (_, mut items) = parse(doc.as_bytes()).unwrap();
        assert_eq!(items.next().unwrap().unwrap().content, "kept");
    }

    #[test]
    fn test_latin1_feed_is_decoded() {
        let mut doc = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<rss version=\"2.0\"><channel><title>Caf\xe9</title>\n<item><title>Cr\xe8me</title><link>https://e.com/a</link>\n<pubDate>Wed, 02 Oct 2002 13:00:00 GMT</pubDate>".to_vec();
        doc.extend_from_slice(b"<description><![CDATA[<p>Br\xfbl\xe9e</p>]]></description></item></channel></rss>");

        let (defaults, mut items) = parse(&doc).unwrap();
        assert_eq!(defaults.sitename.as_deref(), Some("Caf\u{e9}"));
        let item = items.next().unwrap().unwrap();
        assert_eq!(item.title, "Cr\u{e8}me");
        assert_eq!(item.content, "<p>Br\u{fb}l\u{e9}e</p>");
    }

    #[test]
    fn test_atom_xhtml_content_keeps_markup() {
        let doc = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <title>t</title><link href="https://e.org/a"/><updated>2002-10-02T13:00:00Z</updated>
            <content type="xhtml">
              <div xmlns="http://www.w3.org/1999/xhtml"><p>Hello <b>world</b> &amp; more</p></div>
            </content>
        </entry></feed>"#;
        let (_, mut items) = parse(doc.as_bytes()).unwrap();
        let item = items.next().unwrap().unwrap();
        assert_eq!(
            item.content,
            r#"<div xmlns="http://www.w3.org/1999/xhtml"><p>Hello <b>world</b> &amp; more</p></div>"#
        );
        assert!(items.next().is_none());
    }

    #[test]
    fn test_text_after_root_is_not_well_formed() {
        let doc = r#"<rss version="2.0"><channel></channel></rss>trailing junk"#;
        assert!(matches!(
            parse(doc.as_bytes()),
            Err(ParseError::SourceFormat(_))
        ));
    }

    #[test]
    fn test_undefined_entity_is_not_well_formed() {
        let doc = "<rss version=\"2.0\"><channel><title>a &nbsp; b</title></channel></rss>";
        assert!(matches!(
            parse(doc.as_bytes()),
            Err(ParseError::SourceFormat(_))
        ));
    }
}

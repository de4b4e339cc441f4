use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use comrak::options::Options;

/// Parser options shared by the collect and render passes.
///
/// Both passes must parse with identical options or code nodes, and with them
/// block identities, may differ between passes.
pub(crate) fn default_options() -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options);
    options
}

fn configure_extensions(options: &mut Options<'static>) {
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.front_matter_delimiter = Some("---".to_string());

    let render = &mut options.render;
    // Rewritten code nodes become raw HTML blocks, so raw HTML from the
    // document passes too. Hosts that do not trust their markdown enable the
    // sanitizer below.
    render.r#unsafe = true;
    render.sourcepos = false;
}

/// Sanitizer for rendered documents. Keeps the markup the highlighter
/// produces: `class`, `style` and `data-*` on `pre`, `code` and `span`.
pub(crate) fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "blockquote",
        "br",
        "code",
        "del",
        "div",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "img",
        "input",
        "li",
        "ol",
        "p",
        "pre",
        "section",
        "span",
        "strong",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
    ]);
    builder.tags(tags);

    let generic: HashSet<&'static str> = HashSet::from(["class", "id", "title", "lang"]);
    builder.generic_attributes(generic);
    builder.add_generic_attribute_prefixes(&["data-"]);

    builder.add_tag_attributes("pre", &["style"]);
    builder.add_tag_attributes("code", &["style"]);
    builder.add_tag_attributes("span", &["style"]);
    builder.add_tag_attributes("img", &["alt", "width", "height"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);

    builder
}

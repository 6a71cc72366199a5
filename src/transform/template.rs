//! XHTML document shell and theme stylesheets.

use crate::convert::{ConversionOptions, Theme};
use crate::naming::escape_xml;

/// Reflow fixes for e-ink readers.
pub const KINDLE_CSS: &str = "#sbo-rt-content *{word-wrap:break-word!important;word-break:break-word!important;}\
#sbo-rt-content table,#sbo-rt-content pre{overflow-x:unset!important;overflow:unset!important;\
overflow-y:unset!important;white-space:pre-wrap!important;}";

const BASE_CSS: &str = "body{margin:1em;background-color:transparent!important;}
#sbo-rt-content *{text-indent:0pt!important;}
#sbo-rt-content .bq{margin-right:1em!important;}
img{height:auto;max-width:100%;}
pre {background-color:#EEF2F6!important;padding:0.75em 1.5em!important;}";

const COVER_CSS: &str = "#Cover{text-align:center;height:100%;margin:0;padding:0;}\
#Cover img{height:100%;max-width:100%;}";

/// Preset stylesheet for `theme`, empty for [`Theme::None`].
#[must_use]
pub fn theme_css(theme: Theme) -> &'static str {
    match theme {
        Theme::None => "",
        Theme::White => ".ucvMode-white{background:#ffffff;color:#101010;}",
        Theme::Sepia => {
            ".ucvMode-sepia{background:#f4ecd8;color:#523f2a;} .ucvMode-sepia a{color:#274060;}"
        }
        Theme::Black => {
            ".ucvMode-black{background:#070707;color:#f4f4f5;} .ucvMode-black a{color:#60a5fa;}"
        }
    }
}

/// Wraps serialized chapter content in the themed XHTML shell.
///
/// `page_css` is the stylesheet markup (links and inline styles) placed
/// in the head.
#[must_use]
pub fn build_xhtml(title: &str, page_css: &str, inner: &str, options: ConversionOptions) -> String {
    let mut style = String::from(BASE_CSS);
    for extra in [
        if options.kindle { KINDLE_CSS } else { "" },
        theme_css(options.theme),
    ] {
        if !extra.is_empty() {
            style.push('\n');
            style.push_str(extra);
        }
    }
    let mode = options.theme.mode();
    let title = escape_xml(title);

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html lang="en" xml:lang="en" xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
<meta charset="utf-8"/>
<title>{title}</title>
{page_css}
<style type="text/css">
{style}
</style>
</head>
<body><div class="ucvMode-{mode}"><div id="book-content">{inner}</div></div></body>
</html>"#
    )
}

/// Standalone cover document showing `cover_path` full height.
#[must_use]
pub fn cover_page(cover_path: &str, options: ConversionOptions) -> String {
    let markup = format!(
        r#"<div id="Cover"><img src="{}" alt="Book cover"/></div>"#,
        escape_xml(cover_path)
    );
    let css = format!(r#"<style type="text/css">{COVER_CSS}</style>"#);
    build_xhtml("Cover", &css, &markup, options)
}

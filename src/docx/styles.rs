//! Base font normalization in `word/styles.xml`.

use super::xml::Element;

/// `w:rPr` children that follow `w:rFonts`.
const RFONTS_FOLLOWERS: &[&str] = &[
    "w:b", "w:bCs", "w:i", "w:iCs", "w:caps", "w:smallCaps", "w:strike", "w:dstrike",
    "w:outline", "w:shadow", "w:emboss", "w:imprint", "w:noProof", "w:snapToGrid",
    "w:vanish", "w:webHidden", "w:color", "w:spacing", "w:w", "w:kern", "w:position",
    "w:sz", "w:szCs", "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd", "w:fitText",
    "w:vertAlign", "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout", "w:specVanish",
    "w:oMath",
];

const SZ_FOLLOWERS: &[&str] = &[
    "w:szCs", "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd", "w:fitText",
    "w:vertAlign", "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout", "w:specVanish",
    "w:oMath",
];

const SZCS_FOLLOWERS: &[&str] = &[
    "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd", "w:fitText", "w:vertAlign",
    "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout", "w:specVanish", "w:oMath",
];

/// `w:style` children that follow `w:rPr`.
const STYLE_RPR_FOLLOWERS: &[&str] = &["w:tblPr", "w:trPr", "w:tcPr", "w:tblStylePr"];

fn is_normal_paragraph_style(style: &Element) -> bool {
    style.is("w:style")
        && style.attr("w:type") == Some("paragraph")
        && (style.attr("w:styleId") == Some("Normal") || style.attr("w:default") == Some("1"))
}

/// Sets the run font and size of the default paragraph style.
///
/// Returns `false` when the part has no such style.
pub fn set_base_font(styles: &mut Element, font: &str, size_pt: u32) -> bool {
    let half_points = (size_pt * 2).to_string();
    let Some(normal) = styles.elements_mut().find(|e| is_normal_paragraph_style(e)) else {
        return false;
    };
    let rpr = normal.ensure_child_before("w:rPr", STYLE_RPR_FOLLOWERS);

    let fonts = rpr.ensure_child_before("w:rFonts", RFONTS_FOLLOWERS);
    for key in ["w:ascii", "w:hAnsi", "w:cs"] {
        fonts.set_attr(key, font);
    }
    fonts.attrs.retain(|(k, _)| {
        !matches!(k.as_str(), "w:asciiTheme" | "w:hAnsiTheme" | "w:cstheme")
    });

    rpr.ensure_child_before("w:sz", SZ_FOLLOWERS)
        .set_attr("w:val", half_points.as_str());
    rpr.ensure_child_before("w:szCs", SZCS_FOLLOWERS)
        .set_attr("w:val", half_points.as_str());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::parse;

    const STYLES: &str = r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/>
<w:rPr><w:rFonts w:asciiTheme="minorHAnsi" w:hAnsiTheme="minorHAnsi"/><w:color w:val="333333"/><w:lang w:val="fr-FR"/></w:rPr></w:style>
<w:style w:type="table" w:styleId="TableGrid"><w:name w:val="Table Grid"/></w:style>
</w:styles>"#;

    #[test]
    fn normal_style_gets_font_and_size_in_schema_order() {
        let mut styles = parse("word/styles.xml", STYLES.as_bytes()).unwrap();
        assert!(set_base_font(&mut styles, "Calibri", 10));

        let normal = styles.child("w:style").unwrap();
        let rpr = normal.child("w:rPr").unwrap();
        let order: Vec<&str> = rpr.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(order, vec!["w:rFonts", "w:color", "w:sz", "w:szCs", "w:lang"]);

        let fonts = rpr.child("w:rFonts").unwrap();
        assert_eq!(fonts.attr("w:ascii"), Some("Calibri"));
        assert_eq!(fonts.attr("w:asciiTheme"), None);
        assert_eq!(rpr.child("w:sz").unwrap().attr("w:val"), Some("20"));
    }

    #[test]
    fn missing_rpr_is_created() {
        let xml = r#"<w:styles><w:style w:type="paragraph" w:styleId="Normal"><w:name w:val="Normal"/></w:style></w:styles>"#;
        let mut styles = parse("word/styles.xml", xml.as_bytes()).unwrap();
        assert!(set_base_font(&mut styles, "Arial", 11));
        let rpr = styles.child("w:style").and_then(|s| s.child("w:rPr")).unwrap();
        assert_eq!(rpr.child("w:szCs").unwrap().attr("w:val"), Some("22"));
    }

    #[test]
    fn no_paragraph_style_is_reported() {
        let xml = r#"<w:styles><w:style w:type="table" w:styleId="TableGrid"/></w:styles>"#;
        let mut styles = parse("word/styles.xml", xml.as_bytes()).unwrap();
        assert!(!set_base_font(&mut styles, "Calibri", 10));
    }
}

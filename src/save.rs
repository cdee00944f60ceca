use std::fmt::Write;

/// Write `literal` to `f` quoted with `"` or `'`.
///
/// No validation of `literal` is performed; it is assumed not to contain
/// both quote characters at once.
pub(crate) fn write_quoted(f: &mut impl Write, literal: &str) -> std::fmt::Result {
    if !literal.contains('"') {
        write!(f, "\"{literal}\"")
    } else {
        write!(f, "'{literal}'")
    }
}

/// Write character data with the standard entity escapes for `&`, `<` and
/// `>`.
pub(crate) fn write_escaped_char_data(f: &mut impl Write, data: &str) -> std::fmt::Result {
    let mut next = 0;
    for (i, b) in data.bytes().enumerate() {
        let escape = match b {
            b'&' => "&amp;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            _ => continue,
        };
        f.write_str(&data[next..i])?;
        f.write_str(escape)?;
        next = i + 1;
    }
    if next < data.len() {
        f.write_str(&data[next..])?;
    }
    Ok(())
}

/// Write an attribute value quoted with `"`, escaping `&`, `<` and `"`.
///
/// With `escape_whitespace`, tab, line feed and carriage return are written
/// as character references so they survive attribute-value normalization on
/// reparse.
pub(crate) fn write_escaped_att_value(
    f: &mut impl Write,
    value: &str,
    escape_whitespace: bool,
) -> std::fmt::Result {
    f.write_char('"')?;
    let mut next = 0;
    for (i, b) in value.bytes().enumerate() {
        let escape = match b {
            b'&' => "&amp;",
            b'<' => "&lt;",
            b'"' => "&quot;",
            b'\t' if escape_whitespace => "&#9;",
            b'\n' if escape_whitespace => "&#10;",
            b'\r' if escape_whitespace => "&#13;",
            _ => continue,
        };
        f.write_str(&value[next..i])?;
        f.write_str(escape)?;
        next = i + 1;
    }
    if next < value.len() {
        f.write_str(&value[next..])?;
    }
    f.write_char('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_data_escapes() {
        let mut out = String::new();
        write_escaped_char_data(&mut out, "a & b < c > d").unwrap();
        assert_eq!(out, "a &amp; b &lt; c &gt; d");
    }

    #[test]
    fn att_value_escapes() {
        let mut out = String::new();
        write_escaped_att_value(&mut out, "say \"hi\" & <bye>", false).unwrap();
        assert_eq!(out, "\"say &quot;hi&quot; &amp; &lt;bye>\"");

        let mut out = String::new();
        write_escaped_att_value(&mut out, "a\tb", true).unwrap();
        assert_eq!(out, "\"a&#9;b\"");
    }

    #[test]
    fn quoted_literals() {
        let mut out = String::new();
        write_quoted(&mut out, "plain").unwrap();
        assert_eq!(out, "\"plain\"");

        let mut out = String::new();
        write_quoted(&mut out, "has \" quote").unwrap();
        assert_eq!(out, "'has \" quote'");
    }
}

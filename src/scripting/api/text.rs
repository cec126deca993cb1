//! Text formatting helpers shared by scripts and the quick prompt

use pulldown_cmark::{Options, Parser, html};

/// Render GitHub-flavoured markdown to HTML
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Classic hex dump: offset, 16 bytes in groups of two, printable ASCII
pub fn hex_view(bytes: &[u8]) -> String {
    const WIDTH: usize = 16;

    bytes
        .chunks(WIDTH)
        .enumerate()
        .map(|(row, chunk)| {
            let mut hex = String::with_capacity(WIDTH * 3);
            for i in 0..WIDTH {
                match chunk.get(i) {
                    Some(b) => hex.push_str(&format!("{:02x}", b)),
                    None => hex.push_str("  "),
                }
                if i % 2 == 1 && i + 1 < WIDTH {
                    hex.push(' ');
                }
            }

            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();

            format!("{:08x}: {}  {}", row * WIDTH, hex, ascii)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape the HTML special characters
pub fn html_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

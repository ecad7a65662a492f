//! Cyrillic → US key positions, for typing Russian text through a
//! keyboard that sends US scan codes while the game layout is RU.

fn ru_key(c: char) -> Option<char> {
    Some(match c {
        'й' => 'q', 'ц' => 'w', 'у' => 'e', 'к' => 'r', 'е' => 't', 'н' => 'y',
        'г' => 'u', 'ш' => 'i', 'щ' => 'o', 'з' => 'p', 'х' => '[', 'ъ' => ']',
        'ф' => 'a', 'ы' => 's', 'в' => 'd', 'а' => 'f', 'п' => 'g', 'р' => 'h',
        'о' => 'j', 'л' => 'k', 'д' => 'l', 'ж' => ';', 'э' => '\'',
        'я' => 'z', 'ч' => 'x', 'с' => 'c', 'м' => 'v', 'и' => 'b', 'т' => 'n',
        'ь' => 'm', 'б' => ',', 'ю' => '.', 'ё' => '`',
        _ => return None,
    })
}

fn shifted(key: char) -> char {
    match key {
        '[' => '{',
        ']' => '}',
        ';' => ':',
        '\'' => '"',
        ',' => '<',
        '.' => '>',
        '`' => '~',
        k => k.to_ascii_uppercase(),
    }
}

/// Map Cyrillic letters to the US keys at the same position; upper case
/// becomes the shifted key. Everything else passes through.
pub fn ru_to_us(text: &str) -> String {
    text.chars()
        .map(|ch| {
            let lower = ch.to_lowercase().next().unwrap_or(ch);
            match ru_key(lower) {
                Some(k) if ch != lower => shifted(k),
                Some(k) => k,
                None => ch,
            }
        })
        .collect()
}

pub fn has_non_ascii(text: &str) -> bool {
    !text.is_ascii()
}

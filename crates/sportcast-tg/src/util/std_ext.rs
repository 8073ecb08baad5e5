use easy_ext::ext;

pub(crate) mod prelude {
    pub(crate) use super::ErrorExt as _;
    pub(crate) use super::StrExt as _;
}

#[ext(ErrorExt)]
pub(crate) impl<E> E
where
    E: std::error::Error + ?Sized,
{
    fn display_chain(&self) -> display_error_chain::DisplayErrorChain<&Self> {
        display_error_chain::DisplayErrorChain::new(self)
    }
}

#[ext(StrExt)]
pub(crate) impl str {
    /// Length in UTF-16 code units. Telegram measures its limits this way,
    /// so an emoji outside of the basic plane counts as two.
    fn tg_len(&self) -> usize {
        self.encode_utf16().count()
    }

    /// Byte offset where the longest prefix that fits into `max_len` UTF-16
    /// code units ends.
    fn tg_boundary(&self, max_len: usize) -> usize {
        let mut len = 0;
        for (offset, char) in self.char_indices() {
            len += char.len_utf16();
            if len > max_len {
                return offset;
            }
        }
        self.len()
    }

    /// Returns `None` if the string is empty after trimming
    fn non_blank(&self) -> Option<&str> {
        let trimmed = self.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_length_counts_utf16_units() {
        let text = "⚽ goal";
        assert_eq!(text.tg_len(), 6);
        assert_eq!(text.tg_boundary(1), "⚽".len());
        assert_eq!(text.tg_boundary(100), text.len());

        let text = "🏆🏆 cup";
        assert_eq!(text.chars().count(), 6);
        assert_eq!(text.tg_len(), 8);
        assert_eq!(text.tg_boundary(3), "🏆".len());
        assert_eq!(text.tg_boundary(4), "🏆🏆".len());
    }

    #[test]
    fn non_blank() {
        assert_eq!("  \n".non_blank(), None);
        assert_eq!(" hi ".non_blank(), Some("hi"));
    }
}

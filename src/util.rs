use std::fmt;

/// Adapter turning a formatting closure into a `Display` value.
pub(crate) struct DisplayFn<F>(pub(crate) F);

impl<F> fmt::Display for DisplayFn<F>
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.0)(f)
    }
}

use std::marker::PhantomData;

/// Compact, copyable IDs handed out in increasing order, such as the
/// temporaries and labels allocated during code generation.
///
/// Inspired by:
/// - [Handles are the better pointers](https://floooh.github.io/2018/06/17/handles-vs-pointers.html)
pub trait Handle: Copy + Ord {
    fn from_usize(n: usize) -> Self;
    fn to_usize(self) -> usize;
}

/// Allocates handles of one kind. Each compilation owns its own counters, so
/// numbering always starts from zero.
#[derive(Debug)]
pub struct Counter<H> {
    next: usize,
    _marker: PhantomData<H>,
}

impl<H: Handle> Counter<H> {
    pub fn new() -> Self {
        Self {
            next: 0,
            _marker: PhantomData,
        }
    }

    pub fn fresh(&mut self) -> H {
        let handle = H::from_usize(self.next);
        self.next += 1;
        handle
    }

    /// How many handles have been handed out.
    pub fn count(&self) -> usize {
        self.next
    }
}

impl<H: Handle> Default for Counter<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares a handle newtype over an unsigned integer. The optional
/// `display = "prefix"` renders it as `prefix` followed by its index, which
/// is how it is spelled in IR text.
macro_rules! impl_handle {
    (
        $(
            $(#[$attr:meta])*
            $vis:vis struct $name:ident($type:ty) $(, display = $prefix:literal)?;
        )*
    ) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
            $vis struct $name($type);

            impl $crate::handle::Handle for $name {
                #[inline(always)]
                fn from_usize(n: usize) -> $name {
                    $name(n as $type)
                }

                #[inline(always)]
                fn to_usize(self) -> usize {
                    self.0 as usize
                }
            }

            $(
                impl ::std::fmt::Display for $name {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        write!(f, "{}{}", $prefix, self.0)
                    }
                }
            )?
        )*
    };
}

pub(crate) use impl_handle;

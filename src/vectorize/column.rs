//! Fixed-width columns with a null bitmap

/// Bitmap of null positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nulls {
    bits: Vec<u64>,
}

impl Nulls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1 << (index % 64);
    }

    pub fn contains(&self, index: usize) -> bool {
        self.bits
            .get(index / 64)
            .map_or(false, |w| w & (1 << (index % 64)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// A column of values plus null positions.
///
/// A constant column stores one value that stands for every row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column<T> {
    values: Vec<T>,
    nulls: Nulls,
    is_const: bool,
}

impl<T> Column<T> {
    pub fn from_values(values: Vec<T>) -> Self {
        Self {
            values,
            nulls: Nulls::new(),
            is_const: false,
        }
    }

    pub fn constant(value: T) -> Self {
        Self {
            values: vec![value],
            nulls: Nulls::new(),
            is_const: true,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_const(&self) -> bool {
        self.is_const
    }

    pub fn nulls(&self) -> &Nulls {
        &self.nulls
    }

    /// Raw slots. Slots at null positions hold a placeholder.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn is_null(&self, index: usize) -> bool {
        let index = if self.is_const { 0 } else { index };
        self.nulls.contains(index)
    }

    /// Value at `index`, or `None` if it is null or out of range.
    pub fn get(&self, index: usize) -> Option<&T> {
        let index = if self.is_const { 0 } else { index };
        if self.nulls.contains(index) {
            return None;
        }
        self.values.get(index)
    }

    /// Applies `f` to every non-null slot.
    ///
    /// Nulls stay null at the same positions; a slot where `f` yields
    /// `None` becomes null. Constant columns are computed once.
    pub fn map<U: Default>(&self, f: impl Fn(&T) -> Option<U>) -> Column<U> {
        let mut nulls = self.nulls.clone();
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if nulls.contains(i) {
                    return U::default();
                }
                f(v).unwrap_or_else(|| {
                    nulls.add(i);
                    U::default()
                })
            })
            .collect();
        Column {
            values,
            nulls,
            is_const: self.is_const,
        }
    }
}

impl<T: Default> Column<T> {
    pub fn from_options(values: Vec<Option<T>>) -> Self {
        let mut nulls = Nulls::new();
        let values = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.unwrap_or_else(|| {
                    nulls.add(i);
                    T::default()
                })
            })
            .collect();
        Self {
            values,
            nulls,
            is_const: false,
        }
    }

    pub fn null_constant() -> Self {
        let mut nulls = Nulls::new();
        nulls.add(0);
        Self {
            values: vec![T::default()],
            nulls,
            is_const: true,
        }
    }
}

use std::ops::Index;

/// The RC/SC field of an RTCP header is 5 bits.
pub const MAX_ITEMS: usize = 31;

/// List of at most 31 items, the most one RTCP header can count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportList<T>(Vec<T>);

impl<T> ReportList<T> {
    /// Empty list.
    pub fn new() -> Self {
        ReportList(Vec::new())
    }

    /// Number of elements in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Tells if the list contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tells if no more elements fit.
    pub fn is_full(&self) -> bool {
        self.0.len() == MAX_ITEMS
    }

    /// Append an element. Hands the element back if the list is full.
    pub fn push(&mut self, v: T) -> Result<(), T> {
        if self.is_full() {
            return Err(v);
        }
        self.0.push(v);
        Ok(())
    }

    /// Get element at position.
    pub fn get(&self, i: usize) -> Option<&T> {
        self.0.get(i)
    }

    /// Iterator over the elements in the list.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    /// Split any number of items into lists of at most 31.
    pub fn lists_from_iter(iterator: impl IntoIterator<Item = T>) -> Vec<Self> {
        let mut result = vec![];
        let mut current = Self::new();

        for item in iterator {
            if let Err(item) = current.push(item) {
                result.push(std::mem::replace(&mut current, Self::new()));
                // A fresh list always has room.
                let _ = current.push(item);
            }
        }

        if !current.is_empty() {
            result.push(current);
        }

        result
    }
}

impl<T> Default for ReportList<T> {
    fn default() -> Self {
        ReportList::new()
    }
}

impl<T> Index<usize> for ReportList<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> From<T> for ReportList<T> {
    fn from(t: T) -> Self {
        ReportList(vec![t])
    }
}

impl<'a, T> IntoIterator for &'a ReportList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T> IntoIterator for ReportList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

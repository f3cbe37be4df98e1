use serde::{Deserialize, Serialize};

/// An insertion-ordered collection of labelled items
///
/// CCDs within a frame and windows within a CCD are both kept in a [Group]:
/// the order in which they were inserted is the order in which they are iterated,
/// stored and written out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group<T>(Vec<(String, T)>);
impl<T> Default for Group<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}
impl<T> Group<T> {
    pub fn new() -> Self {
        Default::default()
    }
    /// Inserts an item, replacing in place any item with the same label
    pub fn insert<S: Into<String>>(&mut self, label: S, item: T) -> Option<T> {
        let label = label.into();
        match self.get_mut(&label) {
            Some(current) => Some(std::mem::replace(current, item)),
            None => {
                self.0.push((label, item));
                None
            }
        }
    }
    /// Removes and returns the item with the given label
    pub fn remove(&mut self, label: &str) -> Option<T> {
        let idx = self.0.iter().position(|(l, _)| l == label)?;
        Some(self.0.remove(idx).1)
    }
    pub fn get(&self, label: &str) -> Option<&T> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, item)| item)
    }
    pub fn get_mut(&mut self, label: &str) -> Option<&mut T> {
        self.0
            .iter_mut()
            .find(|(l, _)| l == label)
            .map(|(_, item)| item)
    }
    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Iterator over the labels
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }
    /// Iterator over the items
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter().map(|(_, item)| item)
    }
    /// Iterator over the pairs of labels and items
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(l, item)| (l.as_str(), item))
    }
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.0.iter_mut().map(|(l, item)| (l.as_str(), item))
    }
}
impl<S: Into<String>, T> FromIterator<(S, T)> for Group<T> {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut group = Group::new();
        for (label, item) in iter {
            group.insert(label, item);
        }
        group
    }
}
impl<T> IntoIterator for Group<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let group: Group<u32> = [("r", 1), ("g", 2), ("b", 3)].into_iter().collect();
        assert_eq!(group.labels().collect::<Vec<_>>(), vec!["r", "g", "b"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut group: Group<u32> = [("1", 1), ("2", 2), ("3", 3)].into_iter().collect();
        assert_eq!(group.insert("2", 20), Some(2));
        assert_eq!(group.values().copied().collect::<Vec<_>>(), vec![1, 20, 3]);
        assert_eq!(group.remove("1"), Some(1));
        assert_eq!(group.labels().collect::<Vec<_>>(), vec!["2", "3"]);
        assert!(group.remove("1").is_none());
    }
}

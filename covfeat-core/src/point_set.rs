//! Point set container with named per-point scalar fields

use crate::error::{Error, Result};
use crate::point::Point3d;
use serde::{Deserialize, Serialize};
use std::ops::{Index, Range};

/// Identifier of a point inside a [`PointSet`]
pub type PointId = usize;

/// Handle to a field registered on a [`PointSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(usize);

impl FieldId {
    /// Position of the field in registration order
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Storage type declared for a field
///
/// Values are held as `f64` regardless of type; unsigned fields are
/// truncated and clamped to zero when written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Double,
    Unsigned64,
}

impl FieldType {
    fn convert(&self, value: f64) -> f64 {
        match self {
            FieldType::Double => value,
            FieldType::Unsigned64 => value.max(0.0).trunc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Field {
    name: String,
    field_type: FieldType,
    values: Vec<f64>,
}

/// An ordered set of points with named per-point fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointSet {
    positions: Vec<Point3d>,
    fields: Vec<Field>,
}

impl PointSet {
    /// Create a new empty point set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a point set from coordinates, with no fields registered
    pub fn from_positions(positions: Vec<Point3d>) -> Self {
        Self {
            positions,
            fields: Vec::new(),
        }
    }

    /// Get the number of points in the set
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the point set is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Add a point; every registered field gets a zero value for it
    pub fn push(&mut self, position: Point3d) -> PointId {
        self.positions.push(position);
        for field in &mut self.fields {
            field.values.push(0.0);
        }
        self.positions.len() - 1
    }

    /// All point coordinates in identifier order
    pub fn positions(&self) -> &[Point3d] {
        &self.positions
    }

    /// Coordinates of one point
    pub fn position(&self, id: PointId) -> Option<&Point3d> {
        self.positions.get(id)
    }

    /// Register a field, or return the existing one with the same name
    pub fn register_field(&mut self, name: &str, field_type: FieldType) -> FieldId {
        if let Some(id) = self.find_field(name) {
            return id;
        }
        self.fields.push(Field {
            name: name.to_string(),
            field_type,
            values: vec![0.0; self.positions.len()],
        });
        FieldId(self.fields.len() - 1)
    }

    /// Look up a field by name
    pub fn find_field(&self, name: &str) -> Option<FieldId> {
        self.fields
            .iter()
            .position(|field| field.name == name)
            .map(FieldId)
    }

    /// Names of all registered fields in registration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn field_name(&self, id: FieldId) -> Option<&str> {
        self.fields.get(id.0).map(|field| field.name.as_str())
    }

    pub fn field_type(&self, id: FieldId) -> Option<FieldType> {
        self.fields.get(id.0).map(|field| field.field_type)
    }

    /// All values of a field in point order
    pub fn field_values(&self, id: FieldId) -> Option<&[f64]> {
        self.fields.get(id.0).map(|field| field.values.as_slice())
    }

    /// Read one value of a field
    pub fn get_field(&self, id: FieldId, point: PointId) -> Option<f64> {
        self.fields
            .get(id.0)
            .and_then(|field| field.values.get(point))
            .copied()
    }

    /// Read one value of a field by name
    pub fn get_field_by_name(&self, name: &str, point: PointId) -> Option<f64> {
        self.find_field(name)
            .and_then(|id| self.get_field(id, point))
    }

    /// Write one value of a field
    pub fn set_field(&mut self, id: FieldId, point: PointId, value: f64) -> Result<()> {
        let len = self.positions.len();
        let field = self
            .fields
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidData(format!("Unknown field id {}", id.0)))?;
        let slot = field.values.get_mut(point).ok_or_else(|| {
            Error::InvalidData(format!("Point {} out of range for {} points", point, len))
        })?;
        *slot = field.field_type.convert(value);
        Ok(())
    }

    /// Split the set into per-range views for concurrent processing
    ///
    /// Every view can read all coordinates and every field not listed in
    /// `writable`. Fields in `writable` are split so that each view owns the
    /// slots of its own range only. Ranges must be ordered, non-overlapping
    /// and within bounds.
    pub fn partition_mut(
        &mut self,
        ranges: &[Range<PointId>],
        writable: &[FieldId],
    ) -> Result<Vec<PointSetPartition<'_>>> {
        let mut previous_end = 0;
        for range in ranges {
            if range.start < previous_end || range.start > range.end || range.end > self.len() {
                return Err(Error::InvalidData(format!(
                    "Invalid partition {:?} for {} points",
                    range,
                    self.len()
                )));
            }
            previous_end = range.end;
        }
        if let Some(id) = writable.iter().find(|id| id.0 >= self.fields.len()) {
            return Err(Error::InvalidData(format!("Unknown field id {}", id.0)));
        }

        let Self { positions, fields } = self;
        let positions: &[Point3d] = positions;
        let mut partitions: Vec<PointSetPartition<'_>> = ranges
            .iter()
            .map(|range| PointSetPartition {
                range: range.clone(),
                positions,
                columns: Vec::with_capacity(fields.len()),
            })
            .collect();

        for (index, field) in fields.iter_mut().enumerate() {
            if writable.contains(&FieldId(index)) {
                let mut rest: &mut [f64] = &mut field.values;
                let mut offset = 0;
                for partition in &mut partitions {
                    let tail = std::mem::take(&mut rest);
                    let (_, tail) = tail.split_at_mut(partition.range.start - offset);
                    let (chunk, tail) = tail.split_at_mut(partition.range.len());
                    offset = partition.range.end;
                    rest = tail;
                    partition
                        .columns
                        .push(Column::Write(chunk, field.field_type));
                }
            } else {
                let values: &[f64] = &field.values;
                for partition in &mut partitions {
                    partition.columns.push(Column::Read(values));
                }
            }
        }

        Ok(partitions)
    }
}

impl Index<PointId> for PointSet {
    type Output = Point3d;

    fn index(&self, index: PointId) -> &Self::Output {
        &self.positions[index]
    }
}

impl FromIterator<Point3d> for PointSet {
    fn from_iter<I: IntoIterator<Item = Point3d>>(iter: I) -> Self {
        Self::from_positions(Vec::from_iter(iter))
    }
}

#[derive(Debug)]
enum Column<'a> {
    Read(&'a [f64]),
    Write(&'a mut [f64], FieldType),
}

/// A view over one contiguous range of a [`PointSet`]
///
/// Produced by [`PointSet::partition_mut`]. Views are `Send`, so each can be
/// moved to its own worker thread.
#[derive(Debug)]
pub struct PointSetPartition<'a> {
    range: Range<PointId>,
    positions: &'a [Point3d],
    columns: Vec<Column<'a>>,
}

impl<'a> PointSetPartition<'a> {
    /// Points owned by this view
    pub fn range(&self) -> Range<PointId> {
        self.range.clone()
    }

    /// Coordinates of every point in the set, not only this range
    pub fn positions(&self) -> &'a [Point3d] {
        self.positions
    }

    /// Read a field value; writable fields are readable within the range only
    pub fn get_field(&self, id: FieldId, point: PointId) -> Option<f64> {
        match self.columns.get(id.0)? {
            Column::Read(values) => values.get(point).copied(),
            Column::Write(values, _) => {
                let offset = point.checked_sub(self.range.start)?;
                values.get(offset).copied()
            }
        }
    }

    /// Write a field value for a point of this range, converted to the field type
    pub fn set_field(&mut self, id: FieldId, point: PointId, value: f64) -> Result<()> {
        let range = self.range.clone();
        match self.columns.get_mut(id.0) {
            Some(Column::Write(values, field_type)) if range.contains(&point) => {
                values[point - range.start] = field_type.convert(value);
                Ok(())
            }
            Some(Column::Write(..)) => Err(Error::InvalidData(format!(
                "Point {} outside partition {:?}",
                point, range
            ))),
            Some(Column::Read(_)) => Err(Error::InvalidData(format!(
                "Field {} is read-only in this partition",
                id.0
            ))),
            None => Err(Error::InvalidData(format!("Unknown field id {}", id.0))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> PointSet {
        (0..6)
            .map(|i| Point3d::new(i as f64, 0.0, 0.0))
            .collect()
    }

    #[test]
    fn test_register_field_is_idempotent() {
        let mut set = sample_set();
        let first = set.register_field("Linearity", FieldType::Double);
        let second = set.register_field("Linearity", FieldType::Double);
        assert_eq!(first, second);
        assert_eq!(set.field_names().count(), 1);
        assert_eq!(set.field_values(first).unwrap(), &[0.0; 6]);
    }

    #[test]
    fn test_push_extends_fields() {
        let mut set = sample_set();
        let id = set.register_field("Sum", FieldType::Double);
        let point = set.push(Point3d::new(9.0, 9.0, 9.0));
        assert_eq!(point, 6);
        assert_eq!(set.get_field(id, point), Some(0.0));
    }

    #[test]
    fn test_unsigned_field_truncates() {
        let mut set = sample_set();
        let id = set.register_field("OptimalKNN", FieldType::Unsigned64);
        set.set_field(id, 0, 7.9).unwrap();
        set.set_field(id, 1, -3.0).unwrap();
        assert_eq!(set.get_field(id, 0), Some(7.0));
        assert_eq!(set.get_field(id, 1), Some(0.0));
        assert!(set.set_field(id, 42, 1.0).is_err());
    }

    #[test]
    fn test_partition_writes_are_disjoint() {
        let mut set = sample_set();
        let aux = set.register_field("OptimalRadius", FieldType::Double);
        let out = set.register_field("Planarity", FieldType::Double);
        set.set_field(aux, 5, 2.5).unwrap();

        {
            let mut parts = set.partition_mut(&[0..2, 2..4, 4..6], &[out]).unwrap();
            for part in &mut parts {
                for point in part.range() {
                    part.set_field(out, point, point as f64 * 10.0).unwrap();
                }
                assert_eq!(part.get_field(aux, 5), Some(2.5));
            }
            assert!(parts[0].set_field(out, 3, 1.0).is_err());
            assert!(parts[0].set_field(aux, 0, 1.0).is_err());
            assert_eq!(parts[1].get_field(out, 0), None);
        }

        assert_eq!(
            set.field_values(out).unwrap(),
            &[0.0, 10.0, 20.0, 30.0, 40.0, 50.0]
        );
    }

    #[test]
    fn test_partition_writes_follow_field_type() {
        let mut set = sample_set();
        let count = set.register_field("OptimalKNN", FieldType::Unsigned64);

        {
            let mut parts = set.partition_mut(&[0..3, 3..6], &[count]).unwrap();
            parts[0].set_field(count, 1, 4.7).unwrap();
            parts[1].set_field(count, 4, -2.0).unwrap();
            assert_eq!(parts[0].get_field(count, 1), Some(4.0));
        }

        set.set_field(count, 2, 4.7).unwrap();
        assert_eq!(set.get_field(count, 1), set.get_field(count, 2));
        assert_eq!(set.get_field(count, 4), Some(0.0));
    }

    #[test]
    fn test_partition_rejects_overlap() {
        let mut set = sample_set();
        let out = set.register_field("Scattering", FieldType::Double);
        assert!(set.partition_mut(&[0..4, 3..6], &[out]).is_err());
        assert!(set.partition_mut(&[0..7], &[out]).is_err());
        assert!(set.partition_mut(&[0..3, 3..3, 3..6], &[out]).is_ok());
    }
}

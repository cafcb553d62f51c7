use std::path::Path;

use anyhow::Context;

use crate::models::Department;

const DEFAULT_DEPARTMENTS: [&str; 17] = [
    "Administration",
    "Human Resources",
    "Information Technology",
    "Finance",
    "Marketing",
    "Sales",
    "Production",
    "Quality Control",
    "Research & Development",
    "Legal",
    "Procurement",
    "Logistics",
    "Customer Service",
    "Maintenance",
    "Security",
    "Training",
    "Public Relations",
];

pub fn default_departments() -> Vec<Department> {
    DEFAULT_DEPARTMENTS
        .iter()
        .zip(1..)
        .map(|(name, id)| Department {
            id,
            name: name.to_string(),
        })
        .collect()
}

/// Reads an `id,name` CSV and returns the departments ordered by id.
pub fn load_csv(path: &Path) -> anyhow::Result<Vec<Department>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open department catalog {}", path.display()))?;
    let mut departments = Vec::new();

    for result in reader.deserialize::<Department>() {
        departments.push(result?);
    }

    departments.sort_by_key(|department| department.id);
    departments.dedup_by_key(|department| department.id);
    Ok(departments)
}

pub fn department_name(departments: &[Department], id: i32) -> &str {
    departments
        .iter()
        .find(|department| department.id == id)
        .map(|department| department.name.as_str())
        .unwrap_or("Unknown department")
}

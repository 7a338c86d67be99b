use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::{info, warn};

/// What a template depicts. Each category lives in its own directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Enemy,
    Loot,
    Status,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Enemy, Category::Loot, Category::Status];

    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Enemy => "enemies",
            Category::Loot => "loot",
            Category::Status => "status",
        }
    }
}

/// Named grayscale reference image. Immutable after loading.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub category: Category,
    pub image: GrayImage,
}

impl Template {
    pub fn new(name: impl Into<String>, category: Category, image: GrayImage) -> Self {
        Self { name: name.into(), category, image }
    }
}

/// Templates per category, each list in a fixed declaration order.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    pub enemies: Vec<Template>,
    pub loot: Vec<Template>,
    pub status: Vec<Template>,
}

impl TemplateLibrary {
    pub fn get(&self, category: Category) -> &[Template] {
        match category {
            Category::Enemy => &self.enemies,
            Category::Loot => &self.loot,
            Category::Status => &self.status,
        }
    }

    pub fn push(&mut self, template: Template) {
        match template.category {
            Category::Enemy => self.enemies.push(template),
            Category::Loot => self.loot.push(template),
            Category::Status => self.status.push(template),
        }
    }

    /// Keep only the listed enemies, in the listed order. An empty list
    /// keeps everything.
    pub fn restrict_enemies(&mut self, targets: &[String]) {
        if targets.is_empty() {
            return;
        }
        let mut all = std::mem::take(&mut self.enemies);
        for target in targets {
            match all.iter().position(|t| &t.name == target) {
                Some(idx) => self.enemies.push(all.remove(idx)),
                None => warn!("no template for target {}", target),
            }
        }
    }
}

/// Loads templates from `<root>/<category>/*.png`.
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every category. Missing directories are created and yield an
    /// empty set; unreadable images are skipped.
    pub fn load(&self) -> TemplateLibrary {
        let mut library = TemplateLibrary::default();
        for category in Category::ALL {
            for template in self.load_category(category) {
                library.push(template);
            }
        }
        library
    }

    fn load_category(&self, category: Category) -> Vec<Template> {
        let dir = self.root.join(category.dir_name());
        if !dir.is_dir() {
            match fs::create_dir_all(&dir) {
                Ok(()) => warn!("created {}; add {} templates there", dir.display(), category.dir_name()),
                Err(e) => warn!("cannot create {}: {}", dir.display(), e),
            }
            return Vec::new();
        }

        let mut paths: Vec<PathBuf> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
                .collect(),
            Err(e) => {
                warn!("cannot read {}: {}", dir.display(), e);
                return Vec::new();
            }
        };
        paths.sort();

        let mut templates = Vec::new();
        for path in paths {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            match image::open(&path) {
                Ok(img) => {
                    info!("loaded {} template: {}", category.dir_name(), name);
                    templates.push(Template::new(name, category, img.to_luma8()));
                }
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }
        if templates.is_empty() {
            warn!("no {} templates in {}", category.dir_name(), dir.display());
        }
        templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pattern;

    #[test]
    fn test_missing_dirs_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path().join("assets"));
        let library = store.load();
        assert!(library.enemies.is_empty());
        assert!(library.loot.is_empty());
        for category in Category::ALL {
            assert!(store.root().join(category.dir_name()).is_dir());
        }
    }

    #[test]
    fn test_loads_sorted_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let enemies = dir.path().join("enemies");
        fs::create_dir_all(&enemies).unwrap();
        pattern(8, 8, 1).save(enemies.join("Young_Wolf.png")).unwrap();
        pattern(8, 8, 2).save(enemies.join("Kobold Worker.png")).unwrap();
        fs::write(enemies.join("broken.png"), b"not a png").unwrap();
        fs::write(enemies.join("notes.txt"), b"ignored").unwrap();

        let library = TemplateStore::new(dir.path()).load();
        let names: Vec<&str> = library.enemies.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Kobold Worker", "Young_Wolf"]);
    }

    #[test]
    fn test_restrict_enemies_follows_target_order() {
        let mut library = TemplateLibrary::default();
        for name in ["Rabbit", "Young_Wolf", "Defias Thug"] {
            library.push(Template::new(name, Category::Enemy, pattern(4, 4, 0)));
        }
        library.restrict_enemies(&["Defias Thug".into(), "Missing".into(), "Rabbit".into()]);
        let names: Vec<&str> = library.enemies.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Defias Thug", "Rabbit"]);
    }
}

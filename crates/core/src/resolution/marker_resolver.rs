//! Reconciles markers with face clusters and named subjects.
//!
//! Every marker state transition ends in exactly one repository write, so
//! face id, distance, subject and provenance never diverge in storage. On
//! error the caller's marker and the stored row are left as they were.

use std::sync::Arc;

use chrono::Utc;

use crate::faces::domain::collision_reporter::CollisionReporter;
use crate::faces::domain::face::Face;
use crate::faces::domain::face_repository::FaceRepository;
use crate::faces::infrastructure::in_memory_face_repository::InMemoryFaceRepository;
use crate::faces::infrastructure::radius_collision_reporter::RadiusCollisionReporter;
use crate::markers::domain::marker::Marker;
use crate::markers::domain::marker_filter::{MarkerFilter, MarkerUpdate};
use crate::markers::domain::marker_form::MarkerForm;
use crate::markers::domain::marker_repository::MarkerRepository;
use crate::markers::infrastructure::in_memory_marker_repository::InMemoryMarkerRepository;
use crate::resolution::file_locks::FileLocks;
use crate::resolution::resolver_config::ResolverConfig;
use crate::shared::constants::UNKNOWN_DIST;
use crate::shared::error::ResolveError;
use crate::shared::source::Source;
use crate::shared::text;
use crate::subjects::domain::subject::{Subject, SubjectKind};
use crate::subjects::domain::subject_store::SubjectStore;
use crate::subjects::infrastructure::in_memory_subject_store::InMemorySubjectStore;

pub struct MarkerResolver {
    markers: Arc<dyn MarkerRepository>,
    faces: Arc<dyn FaceRepository>,
    subjects: Arc<dyn SubjectStore>,
    collisions: Arc<dyn CollisionReporter>,
    config: ResolverConfig,
    file_locks: FileLocks,
}

impl MarkerResolver {
    pub fn new(
        markers: Arc<dyn MarkerRepository>,
        faces: Arc<dyn FaceRepository>,
        subjects: Arc<dyn SubjectStore>,
        collisions: Arc<dyn CollisionReporter>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            markers,
            faces,
            subjects,
            collisions,
            config,
            file_locks: FileLocks::new(),
        }
    }

    /// Resolver over empty in-memory stores with radius-based collision logging.
    pub fn in_memory(config: ResolverConfig) -> Self {
        let faces: Arc<dyn FaceRepository> = Arc::new(InMemoryFaceRepository::new());
        Self::new(
            Arc::new(InMemoryMarkerRepository::new()),
            faces.clone(),
            Arc::new(InMemorySubjectStore::new()),
            Arc::new(RadiusCollisionReporter::new(faces)),
            config,
        )
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn markers(&self) -> &dyn MarkerRepository {
        self.markers.as_ref()
    }

    pub fn faces(&self) -> &dyn FaceRepository {
        self.faces.as_ref()
    }

    pub fn subjects(&self) -> &dyn SubjectStore {
        self.subjects.as_ref()
    }

    pub fn find_marker(&self, id: u64) -> Result<Option<Marker>, ResolveError> {
        self.markers
            .find(id)
            .map_err(ResolveError::storage("find marker"))
    }

    /// Inserts a new marker after validating its position.
    pub fn create(&self, marker: &mut Marker) -> Result<(), ResolveError> {
        marker.validate_geometry()?;
        self.markers
            .create(marker)
            .map_err(ResolveError::storage("create marker"))
    }

    /// Writes the full marker, inserting it if it has no id yet.
    pub fn save(&self, marker: &mut Marker) -> Result<(), ResolveError> {
        marker.validate_geometry()?;
        if marker.id == 0 {
            return self.create(marker);
        }
        marker.updated_at = Utc::now();
        self.markers
            .save(marker)
            .map_err(ResolveError::storage("save marker"))
    }

    /// Stores a detector or manual candidate, merging it into a nearby
    /// marker on the same file when one exists.
    ///
    /// The existing marker wins only if its source strictly outranks the
    /// candidate's; otherwise it takes over the candidate's geometry, score,
    /// payloads, source and subject link.
    pub fn update_or_create_marker(&self, candidate: Marker) -> Result<Marker, ResolveError> {
        let mut m = candidate;

        if m.id > 0 {
            self.save(&mut m)?;
            log::debug!("faces: saved marker {} for file {}", m.id, m.file_id);
            return Ok(m);
        }

        m.validate_geometry()?;

        let file_id = m.file_id;
        self.file_locks.with_file(file_id, || self.merge_or_insert(m))
    }

    fn merge_or_insert(&self, mut m: Marker) -> Result<Marker, ResolveError> {
        let near = MarkerFilter::near(m.file_id, m.x, m.y, self.config.duplicate_tolerance);
        let existing = self
            .markers
            .first(&near)
            .map_err(ResolveError::storage("find duplicate marker"))?;

        match existing {
            Some(existing) if existing.marker_src.outranks(m.marker_src) => {
                log::debug!(
                    "faces: kept marker {} for file {}, {} outranks {}",
                    existing.id,
                    existing.file_id,
                    existing.marker_src,
                    m.marker_src
                );
                Ok(existing)
            }
            Some(existing) => {
                let update = duplicate_update(&m);
                let updated = self
                    .markers
                    .update(existing.id, &update)
                    .map_err(ResolveError::storage("update duplicate marker"))?;
                log::debug!(
                    "faces: updated existing marker {} for file {}",
                    updated.id,
                    updated.file_id
                );
                Ok(updated)
            }
            None => {
                self.markers
                    .create(&mut m)
                    .map_err(ResolveError::storage("create marker"))?;
                log::debug!("faces: added marker {} for file {}", m.id, m.file_id);
                Ok(m)
            }
        }
    }

    /// Links the marker to `face`. Returns whether face, subject or subject
    /// source changed.
    ///
    /// A negative `dist` means the distance is computed from the marker
    /// embeddings.
    pub fn set_face(
        &self,
        marker: &mut Marker,
        face: Option<&Face>,
        dist: f64,
    ) -> Result<bool, ResolveError> {
        let face = face.ok_or(ResolveError::NilFace)?;
        if !marker.is_face() {
            return Err(ResolveError::NotAFaceMarker(marker.id));
        }

        let mut face = face.clone();

        if is_identity_conflict(marker, &face) {
            return self.report_conflict(marker, &face);
        }

        // A face without subject adopts the marker's; a named face is never overwritten.
        let adopt = face.subject_uid.is_none().then(|| marker.subject_uid.clone()).flatten();
        if let Some(uid) = adopt {
            let assigned = self
                .faces
                .assign_subject_if_empty(&face.id, &uid)
                .map_err(ResolveError::storage("update face subject"))?;
            if assigned {
                face.subject_uid = Some(uid);
            } else if let Some(stored) = self
                .faces
                .find(&face.id)
                .map_err(ResolveError::storage("find face"))?
            {
                face = stored;
                if is_identity_conflict(marker, &face) {
                    return self.report_conflict(marker, &face);
                }
            }
        }

        if marker.face_id.as_deref() == Some(face.id.as_str()) && marker.subject_uid == face.subject_uid {
            self.matched(marker)?;
            marker.face = Some(face);
            return Ok(false);
        }

        let mut next = marker.clone();
        next.face_id = Some(face.id.clone());
        next.face_dist = if dist < 0.0 { next.distance_to(&face) } else { dist };

        if let Some(uid) = &face.subject_uid {
            if next.subject_uid.as_deref() != Some(uid.as_str()) {
                next.subject_uid = Some(uid.clone());
                next.subject_src = Source::Auto;
                next.subject = None;
            }
        }

        next.face = Some(face.clone());
        self.sync_subject(&mut next, false)?;

        let updated = next.face_id != marker.face_id
            || next.subject_uid != marker.subject_uid
            || next.subject_src != marker.subject_src;

        let update = MarkerUpdate {
            face_id: Some(next.face_id.clone()),
            face_dist: Some(next.face_dist),
            subject_uid: Some(next.subject_uid.clone()),
            subject_src: Some(next.subject_src),
            matched_at: Some(Some(Utc::now())),
            ..MarkerUpdate::default()
        };
        self.write(marker, &update, "update marker face")?;
        marker.face = next.face.take();
        marker.subject = next.subject.take();

        Ok(updated)
    }

    /// Keeps subject name, face and sibling markers consistent with the
    /// marker's subject link.
    ///
    /// With `update_related`, other markers on the same face whose subject
    /// was set automatically are moved to this marker's subject.
    pub fn sync_subject(&self, marker: &mut Marker, update_related: bool) -> Result<(), ResolveError> {
        if !marker.is_face() {
            return Ok(());
        }

        let Some(subject) = self.get_subject(marker)? else {
            return Ok(());
        };

        let rename = !marker.name.is_empty()
            && subject.name != marker.name
            && (subject.name.is_empty() || marker.subject_src == Source::Manual);
        let subject = if rename {
            let renamed = self
                .subjects
                .rename(&subject.uid, &marker.name)
                .map_err(ResolveError::collaborator("rename subject"))?;
            marker.subject = Some(renamed.clone());
            renamed
        } else {
            subject
        };

        if marker.face_id.is_none() && marker.subject_src == Source::Manual {
            if let Some(face) = self.get_face(marker)? {
                marker.face_id = Some(face.id);
            }
        }

        let (Some(face_id), Some(uid)) = (marker.face_id.clone(), marker.subject_uid.clone()) else {
            return Ok(());
        };

        let assigned = self
            .faces
            .assign_subject_if_empty(&face_id, &uid)
            .map_err(ResolveError::storage("update known face"))?;
        if assigned {
            if let Some(face) = marker.face.as_mut().filter(|f| f.id == face_id) {
                face.subject_uid = Some(uid.clone());
            }
        }

        if !update_related {
            return Ok(());
        }

        let related = MarkerUpdate {
            subject_uid: Some(Some(uid.clone())),
            subject_src: Some(Source::Auto),
            ..MarkerUpdate::default()
        };
        let changed = self
            .markers
            .update_where(&MarkerFilter::auto_siblings(&face_id, marker.id, &uid), &related)
            .map_err(ResolveError::storage("update related markers"))?;

        log::debug!(
            "marker: matched {} with {face_id}, {changed} related markers updated",
            subject.name
        );

        Ok(())
    }

    /// Resolves the marker's subject, creating one from its name if needed.
    pub fn get_subject(&self, marker: &mut Marker) -> Result<Option<Subject>, ResolveError> {
        if let Some(subject) = marker
            .subject
            .as_ref()
            .filter(|s| marker.subject_uid.as_deref() == Some(s.uid.as_str()))
        {
            return Ok(Some(subject.clone()));
        }

        match marker.subject_uid.clone() {
            None if !marker.name.is_empty() => {
                let subject = self
                    .subjects
                    .first_or_create(&marker.name, SubjectKind::Person, Source::Manual)
                    .map_err(ResolveError::collaborator("create subject"))?;
                marker.subject_uid = Some(subject.uid.clone());
                marker.subject_src = Source::Manual;
                marker.subject = Some(subject.clone());
                Ok(Some(subject))
            }
            None => Ok(None),
            Some(uid) => {
                let subject = self
                    .subjects
                    .find(&uid)
                    .map_err(ResolveError::collaborator("find subject"))?;
                marker.subject = subject.clone();
                Ok(subject)
            }
        }
    }

    /// Resolves the marker's face.
    ///
    /// A faceless marker with a manually set subject mints a new face if
    /// it is large and confident enough; low quality is not an error.
    pub fn get_face(&self, marker: &mut Marker) -> Result<Option<Face>, ResolveError> {
        if let Some(face) = marker
            .face
            .as_ref()
            .filter(|f| marker.face_id.as_deref() == Some(f.id.as_str()))
        {
            return Ok(Some(face.clone()));
        }

        match marker.face_id.clone() {
            None if marker.subject_src == Source::Manual => self.create_face(marker),
            None => Ok(None),
            Some(id) => {
                let face = self
                    .faces
                    .find(&id)
                    .map_err(ResolveError::storage("find face"))?;
                marker.face = face.clone();
                Ok(face)
            }
        }
    }

    fn create_face(&self, marker: &mut Marker) -> Result<Option<Face>, ResolveError> {
        if marker.size < self.config.cluster_min_size || marker.score < self.config.cluster_min_score {
            log::debug!(
                "faces: skipped adding face for low-quality marker {}, size {}, score {}",
                marker.id,
                marker.size,
                marker.score
            );
            return Ok(None);
        }

        let Some(face) = Face::new(marker.subject_uid.clone(), Source::Manual, marker.embeddings())
        else {
            log::debug!("faces: marker {} has no embeddings, no face added", marker.id);
            return Ok(None);
        };

        let face = self
            .faces
            .first_or_create(face)
            .map_err(ResolveError::storage("create face"))?;

        // Same embedding as a face already bound to someone else.
        if face.subject_uid.is_some() && face.subject_uid != marker.subject_uid {
            log::debug!(
                "faces: marker {} matches face {} of subject {}, no face added",
                marker.id,
                face.id,
                face.subject_uid.as_deref().unwrap_or_default()
            );
            return Ok(None);
        }

        if let Err(e) = self.match_markers(&face, MarkerFilter::faceless().exclude(marker.id)) {
            log::error!("faces: {e} (match markers)");
        }

        marker.face_id = Some(face.id.clone());
        marker.face = Some(face.clone());
        Ok(Some(face))
    }

    /// Detaches the face. A manually set subject survives; an automatic
    /// one is cleared along with the face.
    pub fn clear_face(&self, marker: &mut Marker) -> Result<bool, ResolveError> {
        if marker.face_id.is_none() {
            self.matched(marker)?;
            return Ok(false);
        }

        let mut update = MarkerUpdate {
            face_id: Some(None),
            face_dist: Some(UNKNOWN_DIST),
            matched_at: Some(Some(Utc::now())),
            ..MarkerUpdate::default()
        };
        if marker.subject_src == Source::Auto {
            update.subject_uid = Some(None);
        }

        self.write(marker, &update, "clear face")?;
        Ok(true)
    }

    /// Removes the subject link, reporting the detachment to the face as a
    /// potential collision first.
    pub fn clear_subject(&self, marker: &mut Marker, src: Source) -> Result<(), ResolveError> {
        let face = match marker.face.clone() {
            Some(face) => Some(face),
            None => match marker.face_id.as_deref() {
                Some(id) => self
                    .faces
                    .find(id)
                    .map_err(ResolveError::storage("find face"))?,
                None => None,
            },
        };

        if let Some(face) = &face {
            let reported = self
                .collisions
                .report_collision(face, marker.embeddings())
                .map_err(ResolveError::collaborator("report collision"))?;
            if reported {
                log::debug!("faces: collision with {}", face.id);
            }
        }

        let update = MarkerUpdate {
            name: Some(String::new()),
            face_id: Some(None),
            face_dist: Some(UNKNOWN_DIST),
            subject_uid: Some(None),
            subject_src: Some(src),
            ..MarkerUpdate::default()
        };
        self.write(marker, &update, "clear subject")
    }

    /// Refreshes the match timestamp only.
    pub fn matched(&self, marker: &mut Marker) -> Result<(), ResolveError> {
        self.write(marker, &MarkerUpdate::matched(Utc::now()), "update match timestamp")
    }

    /// Applies a manual edit. Returns whether the marker was saved.
    pub fn save_form(&self, marker: &mut Marker, form: &MarkerForm) -> Result<bool, ResolveError> {
        marker.validate_geometry()?;

        let mut next = marker.clone();
        let mut changed = false;

        if next.invalid != form.invalid {
            next.invalid = form.invalid;
            changed = true;
        }

        if !next.invalid && next.score < self.config.valid_score_floor {
            next.score = self.config.valid_score_floor;
            changed = true;
        }

        let name = text::normalize_marker_name(&form.name);
        let named = form.subject_src == Source::Manual && !name.is_empty();
        if named {
            next.subject_src = Source::Manual;
            next.name = name;
            changed = true;
        }

        if !changed {
            return Ok(false);
        }

        // Form columns are stored before any subject, face or sibling is
        // touched. A failure while syncing leaves the manual name on the
        // row, and the next sync resolves it again.
        self.save(&mut next)?;
        *marker = next.clone();

        if named {
            self.sync_subject(&mut next, true)?;
            let link = MarkerUpdate {
                subject_uid: Some(next.subject_uid.clone()),
                subject_src: Some(next.subject_src),
                face_id: Some(next.face_id.clone()),
                ..MarkerUpdate::default()
            };
            self.write(marker, &link, "save subject link")?;
            marker.subject = next.subject.take();
            marker.face = next.face.take();
        }

        Ok(true)
    }

    /// Links every marker selected by `filter` that falls within the
    /// face's match distance. Returns the number of markers updated.
    pub fn match_markers(&self, face: &Face, filter: MarkerFilter) -> Result<usize, ResolveError> {
        let candidates = self
            .markers
            .query(&filter)
            .map_err(ResolveError::storage("find markers to match"))?;

        let mut updated = 0;
        for mut m in candidates {
            if !m.is_face() {
                continue;
            }
            let current = self
                .faces
                .find(&face.id)
                .map_err(ResolveError::storage("find face"))?
                .unwrap_or_else(|| face.clone());
            let Some(dist) = current.match_distance(m.embeddings(), self.config.match_dist) else {
                continue;
            };
            if m.has_face(Some(&current), dist) {
                continue;
            }
            if self.set_face(&mut m, Some(&current), dist)? {
                updated += 1;
            }
        }

        log::debug!("faces: matched {updated} markers with {}", face.id);
        Ok(updated)
    }

    /// Links a faceless marker to the closest matching face, if any.
    pub fn match_faces(&self, marker: &mut Marker) -> Result<bool, ResolveError> {
        if !marker.is_face() || marker.invalid || marker.face_id.is_some() {
            return Ok(false);
        }
        if marker.embeddings().is_empty() {
            return Ok(false);
        }

        let faces = self
            .faces
            .all()
            .map_err(ResolveError::storage("list faces"))?;

        let best = faces
            .iter()
            .filter_map(|f| {
                f.match_distance(marker.embeddings(), self.config.match_dist)
                    .map(|d| (f, d))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((face, dist)) => self.set_face(marker, Some(face), dist),
            None => {
                self.matched(marker)?;
                Ok(false)
            }
        }
    }

    fn report_conflict(&self, marker: &Marker, face: &Face) -> Result<bool, ResolveError> {
        let reported = self
            .collisions
            .report_collision(face, marker.embeddings())
            .map_err(ResolveError::collaborator("report collision"))?;
        if reported {
            log::info!(
                "faces: marker {} (subject {}) collision with {} (subject {}), source {}",
                marker.id,
                marker.subject_uid.as_deref().unwrap_or_default(),
                face.id,
                face.subject_uid.as_deref().unwrap_or_default(),
                marker.subject_src
            );
        }
        Ok(false)
    }

    /// Persists `update` for a saved marker, then mirrors it in memory.
    /// Unsaved markers are only changed in memory.
    fn write(&self, marker: &mut Marker, update: &MarkerUpdate, step: &'static str) -> Result<(), ResolveError> {
        if marker.id != 0 {
            self.markers
                .update(marker.id, update)
                .map_err(ResolveError::storage(step))?;
        }
        update.apply(marker);
        Ok(())
    }
}

/// A manually confirmed subject on the marker disagrees with the face's.
fn is_identity_conflict(marker: &Marker, face: &Face) -> bool {
    match (&marker.subject_uid, &face.subject_uid) {
        (Some(marker_uid), Some(face_uid)) => {
            marker.subject_src == Source::Manual && marker_uid != face_uid
        }
        _ => false,
    }
}

/// Columns a near-duplicate candidate overwrites on the surviving marker.
fn duplicate_update(candidate: &Marker) -> MarkerUpdate {
    MarkerUpdate {
        marker_src: Some(candidate.marker_src),
        x: Some(candidate.x),
        y: Some(candidate.y),
        w: Some(candidate.w),
        h: Some(candidate.h),
        size: Some(candidate.size),
        score: Some(candidate.score),
        landmarks_json: Some(candidate.landmarks_json.clone()),
        embeddings_json: Some(candidate.embeddings_json().to_string()),
        subject_uid: Some(candidate.subject_uid.clone()),
        subject_src: Some(candidate.subject_src),
        ..MarkerUpdate::default()
    }
}

//! A handle-based interface with explicit, deterministic destruction.
//!
//! A [`Session`] owns every [`Attr`], [`Image`], and [`QuantizeResult`] created through it and hands
//! out copyable [`Handle`]s instead of references. Each handle carries the generation of the slot
//! it was issued for, so using a handle after its object was destroyed (or a handle that was never
//! issued by this session) fails with [`Error::UseAfterFree`] instead of reaching a different object.

use crate::{Attr, DitherMode, Error, HandleKind, Image, QuantizeResult};
use palette::Srgba;
use std::{
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    marker::PhantomData,
};

/// A generational reference to an object owned by a [`HandleTable`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

/// A slot in a [`HandleTable`].
#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// An arena of objects addressed by [`Handle`]s. Freed slots are reused with a new generation.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    kind: HandleKind,
}

impl<T> HandleTable<T> {
    /// Creates an empty table whose errors report the given kind of object.
    #[must_use]
    pub const fn new(kind: HandleKind) -> Self {
        Self { slots: Vec::new(), free: Vec::new(), kind }
    }

    /// Stores a value, returning its handle.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            Handle { index, generation: slot.generation, _marker: PhantomData }
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, value: Some(value) });
            Handle { index, generation: 0, _marker: PhantomData }
        }
    }

    fn slot(&self, handle: Handle<T>) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    /// Returns whether the handle refers to a live object.
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.slot(handle).is_some()
    }

    /// Returns the object for a handle.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if the object was destroyed or the handle was never issued.
    pub fn get(&self, handle: Handle<T>) -> Result<&T, Error> {
        self.slot(handle)
            .and_then(|slot| slot.value.as_ref())
            .ok_or(Error::UseAfterFree { kind: self.kind })
    }

    /// Returns the object for a handle mutably.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if the object was destroyed or the handle was never issued.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, Error> {
        let kind = self.kind;
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
            .ok_or(Error::UseAfterFree { kind })
    }

    /// Destroys the object for a handle, returning it.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if the object was already destroyed or the handle was never issued.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T, Error> {
        let kind = self.kind;
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(Error::UseAfterFree { kind })?;

        let value = slot.value.take().ok_or(Error::UseAfterFree { kind })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(value)
    }

    /// Returns the number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns whether there are no live objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A handle to an [`Attr`] in a [`Session`].
pub type AttrHandle = Handle<Attr>;

/// A handle to an [`Image`] in a [`Session`].
pub type ImageHandle = Handle<Image<'static>>;

/// A handle to a [`QuantizeResult`] in a [`Session`].
pub type ResultHandle = Handle<QuantizeResult>;

/// Owns the objects behind [`AttrHandle`]s, [`ImageHandle`]s, and [`ResultHandle`]s.
///
/// # Examples
/// ```
/// # use palquant::{Session, ErrorKind};
/// # fn main() -> Result<(), palquant::Error> {
/// let mut session = Session::new();
/// let attr = session.create_attr();
/// session.set_max_colors(attr, 16)?;
///
/// let pixels = vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 0, 255];
/// let image = session.create_image(attr, pixels, 2, 2, 4)?;
/// let result = session.quantize(attr, image)?;
///
/// let mut indices = [0; 4];
/// session.write_remapped(result, image, &mut indices)?;
/// assert_eq!(session.palette_len(result)?, 4);
///
/// session.destroy_result(result)?;
/// assert_eq!(session.quality(result).unwrap_err().kind(), ErrorKind::UseAfterFree);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    attrs: HandleTable<Attr>,
    images: HandleTable<Image<'static>>,
    results: HandleTable<QuantizeResult>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// The value reported by [`Session::mean_square_error`] when no error is available.
    pub const MSE_UNAVAILABLE: f64 = -1.0;

    /// Creates an empty session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attrs: HandleTable::new(HandleKind::Attr),
            images: HandleTable::new(HandleKind::Image),
            results: HandleTable::new(HandleKind::Result),
        }
    }

    /// Creates an [`Attr`] with the default settings.
    pub fn create_attr(&mut self) -> AttrHandle {
        self.attrs.insert(Attr::new())
    }

    /// Creates an independent copy of an [`Attr`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed.
    pub fn copy_attr(&mut self, attr: AttrHandle) -> Result<AttrHandle, Error> {
        let copy = self.attrs.get(attr)?.clone();
        Ok(self.attrs.insert(copy))
    }

    /// Destroys an [`Attr`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was already destroyed.
    pub fn destroy_attr(&mut self, attr: AttrHandle) -> Result<(), Error> {
        self.attrs.remove(attr).map(drop)
    }

    /// See [`Attr::set_max_colors`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed, or the setter's error.
    pub fn set_max_colors(&mut self, attr: AttrHandle, max_colors: u32) -> Result<(), Error> {
        self.attrs.get_mut(attr)?.set_max_colors(max_colors).map(drop)
    }

    /// See [`Attr::set_quality`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed, or the setter's error.
    pub fn set_quality(&mut self, attr: AttrHandle, min: u32, max: u32) -> Result<(), Error> {
        self.attrs.get_mut(attr)?.set_quality(min, max).map(drop)
    }

    /// See [`Attr::set_quality_target`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed, or the setter's error.
    pub fn set_quality_target(&mut self, attr: AttrHandle, target: u32) -> Result<(), Error> {
        self.attrs.get_mut(attr)?.set_quality_target(target).map(drop)
    }

    /// See [`Attr::set_speed`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed, or the setter's error.
    pub fn set_speed(&mut self, attr: AttrHandle, speed: u32) -> Result<(), Error> {
        self.attrs.get_mut(attr)?.set_speed(speed).map(drop)
    }

    /// See [`Attr::set_min_posterization`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed, or the setter's error.
    pub fn set_min_posterization(&mut self, attr: AttrHandle, bits: u32) -> Result<(), Error> {
        self.attrs.get_mut(attr)?.set_min_posterization(bits).map(drop)
    }

    /// Returns the [`Attr`] behind a handle.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed.
    pub fn attr(&self, attr: AttrHandle) -> Result<&Attr, Error> {
        self.attrs.get(attr)
    }

    /// Creates an image from an `R, G, B` (`components == 3`) or `R, G, B, A` (`components == 4`) buffer.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` was destroyed, or any error of [`Image::from_components`].
    pub fn create_image(
        &mut self,
        attr: AttrHandle,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        components: u32,
    ) -> Result<ImageHandle, Error> {
        self.attrs.get(attr)?;
        let image = Image::from_components(pixels, width, height, components)?;
        Ok(self.images.insert(image))
    }

    /// Destroys an image, releasing its pixel buffer.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `image` was already destroyed.
    pub fn destroy_image(&mut self, image: ImageHandle) -> Result<(), Error> {
        self.images.remove(image).map(drop)
    }

    /// See [`Image::add_fixed_color`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `image` was destroyed, or [`Error::TooManyFixedColors`].
    pub fn add_fixed_color(&mut self, image: ImageHandle, color: Srgba<u8>) -> Result<(), Error> {
        self.images.get_mut(image)?.add_fixed_color(color).map(drop)
    }

    /// Returns the width of an image.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `image` was destroyed.
    pub fn image_width(&self, image: ImageHandle) -> Result<u32, Error> {
        self.images.get(image).map(Image::width)
    }

    /// Returns the height of an image.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `image` was destroyed.
    pub fn image_height(&self, image: ImageHandle) -> Result<u32, Error> {
        self.images.get(image).map(Image::height)
    }

    /// Quantizes an image. No result is created on failure.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `attr` or `image` was destroyed, or any error of [`Attr::quantize`].
    pub fn quantize(&mut self, attr: AttrHandle, image: ImageHandle) -> Result<ResultHandle, Error> {
        let result = self.attrs.get(attr)?.quantize(self.images.get(image)?)?;
        Ok(self.results.insert(result))
    }

    /// Destroys a result, releasing its palette.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was already destroyed.
    pub fn destroy_result(&mut self, result: ResultHandle) -> Result<(), Error> {
        self.results.remove(result).map(drop)
    }

    /// Returns the [`QuantizeResult`] behind a handle.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed.
    pub fn result(&self, result: ResultHandle) -> Result<&QuantizeResult, Error> {
        self.results.get(result)
    }

    /// Returns the palette as `R, G, B, A` bytes.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed.
    pub fn palette_bytes(&self, result: ResultHandle) -> Result<Vec<u8>, Error> {
        self.results.get(result).map(QuantizeResult::palette_bytes)
    }

    /// Returns the number of palette colors.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed.
    pub fn palette_len(&self, result: ResultHandle) -> Result<usize, Error> {
        self.results.get(result).map(QuantizeResult::palette_len)
    }

    /// Remaps an image, writing one palette index per pixel to `out`.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` or `image` was destroyed,
    /// or any error of [`QuantizeResult::remap_into`].
    pub fn write_remapped(
        &self,
        result: ResultHandle,
        image: ImageHandle,
        out: &mut [u8],
    ) -> Result<(), Error> {
        self.results.get(result)?.remap_into(self.images.get(image)?, out)
    }

    /// See [`QuantizeResult::set_dithering_level`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed, or the setter's error.
    pub fn set_dithering_level(&mut self, result: ResultHandle, level: f32) -> Result<(), Error> {
        self.results.get_mut(result)?.set_dithering_level(level).map(drop)
    }

    /// See [`QuantizeResult::set_dither_mode`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed.
    pub fn set_dither_mode(&mut self, result: ResultHandle, mode: DitherMode) -> Result<(), Error> {
        self.results.get_mut(result)?.set_dither_mode(mode);
        Ok(())
    }

    /// See [`QuantizeResult::set_output_gamma`].
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed, or the setter's error.
    pub fn set_output_gamma(&mut self, result: ResultHandle, gamma: f64) -> Result<(), Error> {
        self.results.get_mut(result)?.set_output_gamma(gamma).map(drop)
    }

    /// Returns the gamma of the palette colors.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed.
    pub fn output_gamma(&self, result: ResultHandle) -> Result<f64, Error> {
        self.results.get(result).map(QuantizeResult::output_gamma)
    }

    /// Returns the mean squared error of the palette,
    /// or [`Session::MSE_UNAVAILABLE`] if it is not a finite number.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed.
    pub fn mean_square_error(&self, result: ResultHandle) -> Result<f64, Error> {
        let mse = self.results.get(result)?.mean_square_error();
        Ok(if mse.is_finite() { mse } else { Self::MSE_UNAVAILABLE })
    }

    /// Returns the achieved quality (`0..=100`).
    ///
    /// # Errors
    /// Returns [`Error::UseAfterFree`] if `result` was destroyed.
    pub fn quality(&self, result: ResultHandle) -> Result<u8, Error> {
        self.results.get(result).map(QuantizeResult::quality)
    }

    /// Returns whether an attr handle refers to a live [`Attr`].
    #[must_use]
    pub fn is_valid_attr(&self, attr: AttrHandle) -> bool {
        self.attrs.contains(attr)
    }

    /// Returns whether an image handle refers to a live [`Image`].
    #[must_use]
    pub fn is_valid_image(&self, image: ImageHandle) -> bool {
        self.images.contains(image)
    }

    /// Returns whether a result handle refers to a live [`QuantizeResult`].
    #[must_use]
    pub fn is_valid_result(&self, result: ResultHandle) -> bool {
        self.results.contains(result)
    }
}
